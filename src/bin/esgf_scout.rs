use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use esgf_scout::collection::Collection;
use esgf_scout::config::{ConfigLoader, ResolvedConfig};
use esgf_scout::domain::{
    ALL_PROJECTS, FacetFilters, FilterMode, OutputFormat, ProjectConfig, project_by_name,
};
use esgf_scout::error::ScoutError;
use esgf_scout::esgf::EsgfHttpClient;
use esgf_scout::local::CsvCatalogue;
use esgf_scout::output::{render, write_csv};
use esgf_scout::esgf;
use esgf_scout::vocab::Vocabulary;

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(scout) = report.downcast_ref::<ScoutError>() {
            return ExitCode::from(map_exit_code(scout));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ScoutError) -> u8 {
    match error {
        ScoutError::InvalidFilter(_)
        | ScoutError::UnknownFacets { .. }
        | ScoutError::MissingCatalogue(_)
        | ScoutError::ConfigRead(_)
        | ScoutError::ConfigParse(_)
        | ScoutError::CatalogueRead(_)
        | ScoutError::CatalogueParse(_)
        | ScoutError::CatalogueCsv(_, _)
        | ScoutError::MissingColumn(_) => 2,
        ScoutError::EsgfHttp(_) | ScoutError::EsgfStatus { .. } | ScoutError::EsgfParse(_) => 3,
        _ => 1,
    }
}

fn cli() -> Command {
    let mut cmd = Command::new("esgf-scout")
        .about("Search CMIP and CORDEX model output, reconciling local holdings against ESGF")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("show debugging logs")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("tool configuration file (default esgf-scout.json)")
                .global(true)
                .value_name("FILE"),
        );

    for project in ALL_PROJECTS {
        cmd = cmd.subcommand(project_command(project));
    }

    cmd.subcommand(
        Command::new("generate-metadata")
            .about("Rebuild the facet vocabulary artifact from live ESGF facet counts")
            .arg(
                Arg::new("output")
                    .long("output")
                    .value_name("FILE")
                    .default_value("data/metadata.json.gz"),
            ),
    )
}

fn project_command(project: &ProjectConfig) -> Command {
    let mut cmd = Command::new(project.name)
        .about(format!("Search {} datasets", project.esgf_project))
        .arg(
            Arg::new("filter")
                .long("filter")
                .value_parser(value_parser!(FilterMode))
                .default_value("all")
                .help(
                    "show only local files (local), everything on esgf (remote), \
                     files on esgf but not local (missing), or local plus missing (all)",
                ),
        )
        .arg(
            Arg::new("local")
                .long("local")
                .action(ArgAction::SetTrue)
                .help("see --filter local"),
        )
        .arg(
            Arg::new("remote")
                .long("remote")
                .action(ArgAction::SetTrue)
                .help("see --filter remote"),
        )
        .arg(
            Arg::new("missing")
                .long("missing")
                .action(ArgAction::SetTrue)
                .help("see --filter missing"),
        )
        .arg(
            Arg::new("request")
                .long("request")
                .action(ArgAction::SetTrue)
                .help("request missing datasets be downloaded"),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .value_name("FILE")
                .num_args(0..=1)
                .default_missing_value(format!("{}_query.csv", project.name))
                .help("store output in a csv file"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_parser(value_parser!(OutputFormat))
                .default_value("list")
                .help("output format"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .action(ArgAction::SetTrue)
                .help("see --format stats"),
        );

    for facet in project.facets {
        let mut arg = Arg::new(facet.name)
            .long(facet.name)
            .value_name("VALUE")
            .num_args(1..)
            .action(ArgAction::Append)
            .help_heading("esgf search facets");
        for alias in facet.aliases {
            arg = arg.alias(*alias);
        }
        cmd = cmd.arg(arg);
    }

    cmd
}

fn run() -> miette::Result<()> {
    let matches = cli().get_matches();

    let filter = if matches.get_flag("debug") {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ConfigLoader::resolve(matches.get_one::<String>("config").map(String::as_str))?;

    match matches.subcommand() {
        Some(("generate-metadata", sub)) => run_generate_metadata(sub, &config),
        Some((name, sub)) => {
            let project = project_by_name(name)
                .ok_or_else(|| miette::Report::msg(format!("unknown subcommand {name}")))?;
            run_search(&project, sub, &config)
        }
        None => Err(miette::Report::msg(
            "command required (try `esgf-scout --help`)",
        )),
    }
}

fn run_search(
    project: &ProjectConfig,
    matches: &ArgMatches,
    config: &ResolvedConfig,
) -> miette::Result<()> {
    let mode = if matches.get_flag("local") {
        FilterMode::Local
    } else if matches.get_flag("remote") {
        FilterMode::Remote
    } else if matches.get_flag("missing") {
        FilterMode::Missing
    } else {
        *matches
            .get_one::<FilterMode>("filter")
            .expect("filter has a default")
    };

    let format = if matches.get_flag("stats") {
        OutputFormat::Stats
    } else {
        *matches
            .get_one::<OutputFormat>("format")
            .expect("format has a default")
    };

    let mut filters = FacetFilters::new();
    for facet in project.facets {
        if let Some(values) = matches.get_many::<String>(facet.name) {
            filters.insert(facet.name, values.cloned().collect());
        }
    }

    let vocab = Vocabulary::cached()?;
    let remote = EsgfHttpClient::new(config.search_endpoint.as_str())?;
    let local = match (mode, config.catalogue_for(project.name)) {
        (FilterMode::Remote, _) | (_, None) => None,
        (_, Some(path)) => Some(CsvCatalogue::open(path)?),
    };

    let collection = Collection::new(*project, remote, local, vocab);
    let table = collection.catalogue(&filters, mode)?;

    if let Some(csv_path) = matches.get_one::<String>("csv") {
        write_csv(PathBuf::from(csv_path).as_path(), project, &table)?;
        info!("wrote {csv_path}");
    }

    let mut stdout = std::io::stdout().lock();
    render(&mut stdout, project, &table, format)
        .map_err(|err| ScoutError::Filesystem(err.to_string()))?;

    if matches.get_flag("request") {
        warn!("dataset download requests are handled by the data request service; not sent");
    }

    Ok(())
}

fn run_generate_metadata(matches: &ArgMatches, config: &ResolvedConfig) -> miette::Result<()> {
    let output_path = matches
        .get_one::<String>("output")
        .expect("output has a default");

    let client = EsgfHttpClient::new(config.search_endpoint.as_str())?;
    let mut vocab = Vocabulary::new();
    for project in ALL_PROJECTS {
        info!("fetching {} facet values", project.esgf_project);
        let facets: Vec<String> = project.facet_names().map(str::to_string).collect();
        let values = esgf::facet_values(&client, project.esgf_project, &facets)?;
        for (facet, values) in values {
            vocab.insert_facet(project.esgf_project, facet, values);
        }
    }

    let bytes = vocab.to_gzipped_json()?;
    std::fs::write(output_path, bytes)
        .map_err(|err| ScoutError::Filesystem(err.to_string()))?;
    info!("wrote {output_path}");

    Ok(())
}
