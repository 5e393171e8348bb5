use anyhow::Result;
use colored::Colorize;
use pushwire_dispatch::generate_vapid_keys;

use crate::cli::OutputFormat;
use crate::output::print_json;

pub fn vapid_keys(format: OutputFormat) -> Result<()> {
    let keys = generate_vapid_keys();
    match format {
        OutputFormat::Json => print_json(&keys),
        OutputFormat::Table => {
            println!("{}: {}", "Public key".cyan(), keys.public_key);
            println!("{}: {}", "Private key".cyan(), keys.private_key);
            Ok(())
        }
    }
}
