use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod options {
    use std::path::PathBuf;

    #[derive(Debug, clap::Parser)]
    #[clap(
        name = "cardfill",
        about = "Fill bank card payment templates from spreadsheets of payees"
    )]
    pub struct Args {
        /// The spreadsheet with one payee per row, as .xlsx, .xls or .csv.
        pub input: Option<PathBuf>,
        /// The name of the unit in the configuration whose rules to apply.
        pub unit: Option<String>,
        /// 1 to 12, 01 to 09, '年终奖' or '补偿金'.
        pub month: Option<String>,
        /// The directory to write generated files into.
        #[clap(long, default_value = "output/")]
        pub output_dir: PathBuf,
        /// The JSON configuration file with all units and their rule groups.
        #[clap(long, default_value = "config.json")]
        pub config: PathBuf,
        /// The name of generated files, with {unit_name}, {template_name}, {month}, {count}, {amount}, {amount:.2f} and {ext}.
        #[clap(long, default_value = cardfill::naming::DEFAULT_TEMPLATE)]
        pub output_filename_template: String,
        /// Merge the generated files in this folder into one file per unit and template, written to its 'result' subdirectory.
        ///
        /// The positional arguments must not be given in this mode.
        #[clap(long)]
        pub merge_folder: Option<PathBuf>,
        /// In merge mode, keep differing month values of a group row by row instead of failing.
        #[clap(long)]
        pub allow_mixed_months: bool,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    if let Err(err) = run(options::Args::parse()) {
        tracing::error!("{err:#}");
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run(args: options::Args) -> anyhow::Result<()> {
    if let Some(month) = args.month.as_deref().filter(|_| args.merge_folder.is_none()) {
        cardfill::run::validate_month(month)?;
    }
    let config = cardfill::config::Config::load(&args.config)
        .with_context(|| format!("Could not load configuration from '{}'", args.config.display()))?;

    if let Some(folder) = args.merge_folder {
        if args.input.is_some() || args.unit.is_some() || args.month.is_some() {
            bail!("--merge-folder does not take the input file, unit or month arguments");
        }
        let outcome = cardfill::merge(
            &folder,
            &config,
            cardfill::merge::Options {
                allow_mixed_months: args.allow_mixed_months,
            },
        )
        .with_context(|| format!("Could not merge the files in '{}'", folder.display()))?;
        for (path, stats) in outcome.outputs {
            println!("{}\t{}\t{:.2}", path.display(), stats.count, stats.amount);
        }
        return Ok(());
    }

    let (Some(input), Some(unit), Some(month)) = (args.input, args.unit, args.month) else {
        bail!("The input file, unit and month are required unless --merge-folder is given");
    };
    let outputs = cardfill::run(
        &input,
        &unit,
        &month,
        &config,
        &cardfill::run::Options {
            output_dir: args.output_dir,
            filename_template: args.output_filename_template,
        },
    )
    .with_context(|| format!("Could not process '{}' for unit '{unit}'", input.display()))?;
    for output in outputs {
        println!(
            "{}\t{}\t{:.2}",
            output.path.display(),
            output.stats.count,
            output.stats.amount
        );
    }
    Ok(())
}
