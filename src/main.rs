use clap::{Arg, ArgMatches, Command};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rototiller::config::{self, RawArgs, TaskKind};
use rototiller::convert::Ogr2Ogr;
use rototiller::error::{ConfigError, Error};

fn env_arg(id: &'static str, long: &'static str, env: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .env(env)
        .num_args(1)
        .allow_hyphen_values(true)
        .help(help)
}

fn cli() -> Command {
    Command::new("rototiller")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Jesper Fjellin")
        .about("Single-layer vector processing: buffer, filter, lookup, reprojection, cleanup")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            env_arg(
                "input",
                "input",
                config::INPUT_FILE,
                "Input .zip (shapefile set), .json or .geojson",
            )
            .short('i')
            .global(true),
        )
        .arg(
            env_arg(
                "output-dir",
                "output-dir",
                config::OUTPUT_DIR,
                "Directory receiving output.json / output.zip",
            )
            .short('o')
            .global(true),
        )
        .arg(
            env_arg(
                "work-dir",
                "work-dir",
                config::WORK_DIR,
                "Directory for temporary files",
            )
            .global(true),
        )
        .arg(
            env_arg(
                "ogr2ogr",
                "ogr2ogr",
                config::OGR2OGR,
                "Path of the ogr2ogr program",
            )
            .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .global(true)
                .help("Log filter, e.g. info or rototiller=debug (overrides RUST_LOG)"),
        )
        .subcommand(
            Command::new("buffer")
                .about("Buffer every geometry by a fixed distance")
                .arg(env_arg(
                    "distance",
                    "distance",
                    config::BUFFER_DISTANCE,
                    "Buffer distance, greater than zero",
                ))
                .arg(env_arg(
                    "quadrant-segments",
                    "quadrant-segments",
                    config::QUADRANT_SEGMENT_COUNT,
                    "Segments used to approximate a quarter circle",
                ))
                .arg(env_arg(
                    "split-threshold",
                    "split-threshold",
                    config::SPLIT_THRESHOLD,
                    "Parts at which a geometry is split before buffering",
                ))
                .arg(env_arg(
                    "max-split-depth",
                    "max-split-depth",
                    config::MAX_SPLIT_DEPTH,
                    "Deepest quadrant split allowed",
                ))
                .arg(env_arg(
                    "max-split-pieces",
                    "max-split-pieces",
                    config::MAX_SPLIT_PIECES,
                    "Most pieces one geometry may be split into",
                )),
        )
        .subcommand(
            Command::new("filter")
                .about("Keep only features whose column equals a value")
                .arg(env_arg(
                    "column",
                    "column",
                    config::FILTER_COLUMN,
                    "Attribute column to compare",
                ))
                .arg(env_arg(
                    "value",
                    "value",
                    config::FILTER_VALUE,
                    "Value to keep",
                )),
        )
        .subcommand(
            Command::new("lookup")
                .about("Find the features intersecting a point or polygon")
                .arg(env_arg(
                    "attributes",
                    "attributes",
                    config::ATTRIBUTES,
                    "Comma-separated attributes to report",
                ))
                .arg(env_arg(
                    "polygon",
                    "polygon",
                    config::POLYGON,
                    "Query polygon as WKT",
                ))
                .arg(env_arg(
                    "longitude",
                    "longitude",
                    config::LONGITUDE,
                    "Query point longitude",
                ))
                .arg(env_arg(
                    "latitude",
                    "latitude",
                    config::LATITUDE,
                    "Query point latitude",
                ))
                .arg(env_arg(
                    "mode",
                    "mode",
                    config::LOOKUP_MODE,
                    "report (default) or extract",
                )),
        )
        .subcommand(
            Command::new("reproject")
                .about("Transform every geometry to another coordinate system")
                .arg(env_arg(
                    "target-projection",
                    "target-projection",
                    config::TARGET_PROJECTION,
                    "Target EPSG code",
                )),
        )
        .subcommand(Command::new("remove-invalid").about("Delete features with invalid geometry"))
        .subcommand(Command::new("validate").about("Check that the input opens and has a layer"))
}

fn value(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.try_get_one::<String>(id).ok().flatten().cloned()
}

fn raw_args(matches: &ArgMatches) -> Result<RawArgs, Error> {
    let (name, sub) = matches
        .subcommand()
        .ok_or(ConfigError::Missing { name: "task" })?;
    let mut raw = RawArgs::new(name.parse::<TaskKind>()?);

    raw.input = value(sub, "input");
    raw.output_dir = value(sub, "output-dir");
    raw.work_dir = value(sub, "work-dir");
    raw.ogr2ogr = value(sub, "ogr2ogr");
    raw.distance = value(sub, "distance");
    raw.quadrant_segments = value(sub, "quadrant-segments");
    raw.split_threshold = value(sub, "split-threshold");
    raw.max_split_depth = value(sub, "max-split-depth");
    raw.max_split_pieces = value(sub, "max-split-pieces");
    raw.column = value(sub, "column");
    raw.value = value(sub, "value");
    raw.attributes = value(sub, "attributes");
    raw.polygon = value(sub, "polygon");
    raw.longitude = value(sub, "longitude");
    raw.latitude = value(sub, "latitude");
    raw.mode = value(sub, "mode");
    raw.target_projection = value(sub, "target-projection");
    Ok(raw)
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let matches = cli().get_matches();
    let log_level = matches
        .subcommand()
        .and_then(|(_, sub)| value(sub, "log-level"))
        .or_else(|| value(&matches, "log-level"));
    init_logging(log_level.as_deref());

    let result = raw_args(&matches)
        .and_then(RawArgs::into_config)
        .and_then(|config| {
            let converter = Ogr2Ogr::new(&config.ogr2ogr);
            rototiller::run(&config, &converter)
        });

    match result {
        Ok(summary) => {
            for artifact in &summary.artifacts {
                info!("Output: {}", artifact.display());
            }
        }
        Err(err) => {
            error!("{} error: {err}", err.category());
            std::process::exit(err.exit_code());
        }
    }
}
