use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use log::{error, LevelFilter};

use stacrio::{
    components::{fetch::DefaultFetcher, source::GdalSource},
    pipeline::{self, Pipeline, Selection},
    AttributeFilter, Bbox, Config, EndpointResolver, Interval, Renderer, Result, Search,
    SearchPredicate, StacrioError,
};

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(long, global = true, help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Raise the log level, repeatable"
    )]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rank the data types an endpoint may hold.
    Resolve {
        url: String,
        #[clap(long, help = "Fetch the document to refine the ranking")]
        probe: bool,
    },
    /// List the items matching a predicate.
    Search {
        url: Option<String>,
        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Render bands of the found items to an image.
    Render {
        url: Option<String>,
        #[clap(flatten)]
        filters: FilterArgs,
        #[clap(
            long,
            value_delimiter = ',',
            required = true,
            help = "Bands by asset key or common name"
        )]
        bands: Vec<String>,
        #[clap(long, help = "Stack every found item along time")]
        time_stack: bool,
        #[clap(long, default_value_t = 0, help = "Item index, or time index with --time-stack")]
        index: usize,
        #[clap(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[clap(long, allow_hyphen_values = true, help = "minx,miny,maxx,maxy in EPSG:4326")]
    bbox: Option<Bbox>,
    #[clap(long, help = "Instant or start/end interval, open ends as ..")]
    datetime: Option<Interval>,
    #[clap(long = "collection")]
    collections: Vec<String>,
    #[clap(long = "filter", help = "Property comparison like eo:cloud_cover<20")]
    filters: Vec<AttributeFilter>,
    #[clap(long)]
    max_items: Option<usize>,
}

impl FilterArgs {
    fn search(&self, config: &Config) -> Search {
        let mut predicate = if self.collections.is_empty() {
            config.predicate()
        } else {
            let predicate = SearchPredicate::new().with_collections(self.collections.clone());
            match config.search.max_items {
                Some(max_items) => predicate.with_max_items(max_items),
                None => predicate,
            }
        };
        if let Some(bbox) = self.bbox {
            predicate = predicate.with_bbox(bbox);
        }
        if let Some(datetime) = self.datetime {
            predicate = predicate.with_datetime(datetime);
        }
        for filter in &self.filters {
            predicate = predicate.with_filter(filter.clone());
        }
        if let Some(max_items) = self.max_items {
            predicate = predicate.with_max_items(max_items);
        }
        Search::new(predicate).with_page_size(config.search.limit)
    }
}

fn endpoint(url: Option<String>, config: &Config) -> Result<String> {
    url.or_else(|| config.endpoint.clone())
        .ok_or_else(|| StacrioError::Config("no endpoint given and none configured".into()))
}

fn init_logging(verbose: u8, config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    let level = match (verbose, config.log_level()?) {
        (0, Some(level)) => Some(level),
        (0, None) => None,
        (1, _) => Some(LevelFilter::Info),
        (2, _) => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    };
    if let Some(level) = level {
        builder.filter_module("stacrio", level);
    }
    builder.init();
    Ok(())
}

fn execute(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    init_logging(cli.verbose, &config)?;
    stacrio::init()?;

    match cli.command {
        Command::Resolve { url, probe } => {
            let tags = if probe {
                EndpointResolver::probe(&DefaultFetcher::new(&config.user_agent)?, &url)?
            } else {
                EndpointResolver::recommend(&url)?
            };
            for tag in tags {
                println!("{tag}");
            }
        }
        Command::Search { url, filters } => {
            let url = endpoint(url, &config)?;
            let pipeline = Pipeline::new(config.reader()?);
            let found = pipeline
                .resolve(&url)?
                .open()?
                .search(&filters.search(&config))?;
            for item in found.items() {
                let datetime = item
                    .datetime()
                    .map(|datetime| datetime.to_rfc3339())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{}\t{}\t{}",
                    item.id(),
                    datetime,
                    item.collection().unwrap_or("-")
                );
            }
        }
        Command::Render {
            url,
            filters,
            bands,
            time_stack,
            index,
            output,
        } => {
            let url = endpoint(url, &config)?;
            let pipeline = Pipeline::new(config.reader()?);
            let mut selection = Selection::new(bands);
            if let Some(bbox) = filters.bbox {
                selection = selection.with_clip(bbox);
            }
            let mut options = config.render;
            if time_stack {
                selection = selection.with_time_stack();
                options.time_index = index;
            } else {
                selection = selection.with_index(index);
            }
            let rendered = pipeline::run::<f32, _>(
                &pipeline,
                &GdalSource::new(),
                &url,
                &filters.search(&config),
                &selection,
                &Renderer::new(options),
            )?;
            rendered.save(&output)?;
            println!("{:?}", rendered.georeference);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
