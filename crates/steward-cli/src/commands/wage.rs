//! `steward wage`

use crate::app::{OutputFormat, WageArgs};
use anyhow::Result;
use steward_core::{load_snapshot, Config, DataLayout};

pub async fn run(args: WageArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let layout = DataLayout::new(config.data_dir());
    let snapshot = load_snapshot(&layout, &args.contract_id)?;

    let result = snapshot.wage_table.lookup(
        &args.classification,
        args.hours,
        args.months,
        args.date.as_deref(),
    );

    match result {
        Some(wage) => {
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&wage)?);
            } else {
                println!(
                    "{}: ${:.2} ({}, effective {}) [{}]",
                    wage.classification, wage.rate, wage.step, wage.effective_date, wage.citation
                );
            }
            Ok(())
        }
        None => {
            anyhow::bail!(
                "no wage entry for classification '{}' in contract {}",
                args.classification,
                args.contract_id
            )
        }
    }
}
