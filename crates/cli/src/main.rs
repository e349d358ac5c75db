mod logging;

use anyhow::{bail, Context};
use chrono::Datelike;
use clap::{Args, Parser, Subcommand};
use legis_core::api::ApiClient;
use legis_core::config::Settings;
use legis_core::import::ImportOptions;
use legis_core::outcome::Tally;
use legis_core::store::Store;
use legis_core::{pipeline, Provider};
use std::ops::RangeInclusive;

#[derive(Parser)]
#[command(
    name = "legis",
    version,
    about = "Scrape legislative voting records and send them to the import API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the votings of a year
    #[command(visible_alias = "listado")]
    Listing(YearRange),
    /// Download the details and votes of every voting of a year
    #[command(visible_alias = "detalles")]
    Details(YearRange),
    /// Send everything downloaded for a year to the import API
    #[command(visible_alias = "importar")]
    Import {
        /// lower-chamber (diputados) or upper-chamber (senadores)
        #[arg(value_parser = parse_provider)]
        provider: Provider,

        /// Defaults to the current year
        year: Option<i32>,

        /// Only send these votings
        ids: Vec<u64>,

        /// Do not send bill records
        #[arg(long)]
        no_records: bool,

        /// Do not send votes
        #[arg(long)]
        no_votes: bool,

        /// Skip votings sent by an earlier run and remember new ones
        #[arg(long)]
        ledger: bool,
    },
}

#[derive(Args)]
struct YearRange {
    /// lower-chamber (diputados) or upper-chamber (senadores)
    #[arg(value_parser = parse_provider)]
    provider: Provider,

    /// Defaults to the current year
    year: Option<i32>,

    /// Process every year up to this one
    #[arg(long)]
    to: Option<i32>,
}

impl YearRange {
    fn years(&self) -> anyhow::Result<RangeInclusive<i32>> {
        let from = self.year.unwrap_or_else(current_year);
        let to = self.to.unwrap_or(from);
        if to < from {
            bail!("--to {to} is before {from}");
        }
        Ok(from..=to)
    }
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    s.parse().map_err(|e: legis_core::Error| e.to_string())
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    logging::init(&settings.log_dir, settings.environment.is_production())?;

    match cli.command {
        Commands::Listing(range) => {
            for year in range.years()? {
                let votings = pipeline::run_listing(&settings, range.provider, year)
                    .with_context(|| format!("listing {} {year}", range.provider))?;
                println!("{} {year}: {} votings", range.provider, votings.len());
            }
        }
        Commands::Details(range) => {
            let years = range.years()?;
            let (first, last) = (*years.start(), *years.end());
            let mut total = Tally::default();
            for year in years {
                let tally = pipeline::run_details(&settings, range.provider, year)
                    .with_context(|| format!("details {} {year}", range.provider))?;
                println!("{} {year}: {tally}", range.provider);
                total.merge(tally);
            }
            if last > first {
                tracing::info!(provider = %range.provider, first, last, %total, "range finished");
                println!("{} {first}-{last}: {total}", range.provider);
            }
        }
        Commands::Import {
            provider,
            year,
            ids,
            no_records,
            no_votes,
            ledger,
        } => {
            let year = year.unwrap_or_else(current_year);
            let client = ApiClient::new(&settings.api)?;
            let store = Store::new(&settings.data_dir);
            let options = ImportOptions {
                only: ids,
                records: !no_records,
                votes: !no_votes,
                ledger,
            };
            let tally = pipeline::run_import(&client, &store, provider, year, &options)
                .with_context(|| format!("import {provider} {year}"))?;
            println!("{provider} {year}: {tally}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spanish_aliases() {
        let cli =
            Cli::try_parse_from(["legis", "listado", "diputados", "2019", "--to", "2020"]).unwrap();
        let Commands::Listing(range) = cli.command else {
            panic!("expected listing");
        };
        assert_eq!(range.provider, Provider::LowerChamber);
        assert_eq!(range.years().unwrap(), 2019..=2020);
    }

    #[test]
    fn import_takes_an_id_filter() {
        let args = ["legis", "importar", "senadores", "2019", "42", "77", "--no-votes"];
        let cli = Cli::try_parse_from(args).unwrap();
        let Commands::Import {
            provider,
            year,
            ids,
            no_votes,
            ..
        } = cli.command
        else {
            panic!("expected import");
        };
        assert_eq!(provider, Provider::UpperChamber);
        assert_eq!(year, Some(2019));
        assert_eq!(ids, vec![42, 77]);
        assert!(no_votes);
    }

    #[test]
    fn unknown_providers_fail_while_parsing() {
        assert!(Cli::try_parse_from(["legis", "listing", "concejo"]).is_err());
    }

    #[test]
    fn rejects_backwards_ranges() {
        let range = YearRange {
            provider: Provider::LowerChamber,
            year: Some(2020),
            to: Some(2019),
        };
        assert!(range.years().is_err());
    }
}
