//! Directional ensemble demo driver
//!
//! Trains the ensemble on a synthetic ordered dataset and prints the run's
//! statistics and a prediction.

use clap::{Parser, Subcommand};
use direction_ensemble::{
    config::Config,
    ensemble::DirectionalEnsemble,
    testing::{SeriesSpec, TestDataGenerator},
    weights::{FixedWeightProvider, ModelWeights, WeightProvider},
};
use std::collections::BTreeMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "direction-ensemble")]
#[command(about = "Two-model directional ensemble with purged walk-forward validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a synthetic series and print training stats
    Train {
        /// Number of time-ordered rows
        #[arg(short, long, default_value = "300")]
        rows: usize,
        /// Number of feature columns
        #[arg(short, long, default_value = "4")]
        features: usize,
        /// Share of neutral labels
        #[arg(long, default_value = "0.8")]
        neutral_share: f64,
        /// Data generator seed
        #[arg(long, default_value = "7")]
        data_seed: u64,
        /// Blend weights as name=weight pairs, e.g. rf=0.6,gb=0.4
        #[arg(long, value_delimiter = ',')]
        weights: Vec<String>,
        /// Print stats as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Train {
            rows,
            features,
            neutral_share,
            data_seed,
            weights,
            json,
        } => train(config, rows, features, neutral_share, data_seed, &weights, json),
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn parse_weights(pairs: &[String]) -> anyhow::Result<ModelWeights> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected name=weight, got {}", pair))?;
        map.insert(name.trim().to_string(), value.trim().parse::<f64>()?);
    }
    Ok(ModelWeights::new(map)?)
}

fn train(
    config: Config,
    rows: usize,
    features: usize,
    neutral_share: f64,
    data_seed: u64,
    weights: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let spec = SeriesSpec {
        n_rows: rows,
        n_features: features,
        neutral_share,
        ..SeriesSpec::default()
    };
    let (x, y) = TestDataGenerator::new(data_seed).directional_series(&spec);
    tracing::info!("Generated {} rows x {} features", rows, features);

    let horizon = config.weights.horizon.clone();
    let mut ensemble = if weights.is_empty() {
        DirectionalEnsemble::new(config)?
    } else {
        let provider = FixedWeightProvider(parse_weights(weights)?);
        tracing::info!("Using weights {:?}", provider.get_weights(&horizon, None));
        DirectionalEnsemble::with_provider(config, &provider, &horizon, None)
    };

    let stats = ensemble.train(&x, &y)?;
    if json {
        println!("{}", stats.to_json()?);
    } else {
        println!("Run {} ({} rows, {} holdout)", stats.run_id, stats.n_samples, stats.n_holdout);
        for (name, outcome) in &stats.outcomes {
            println!("  {:<3} {:?} weight={:.3}", name, outcome, stats.weights.get(name));
        }
        for (name, m) in &stats.holdout_metrics {
            println!(
                "  holdout {:<8} accuracy={:.3} macro_f1={:.3} balanced_accuracy={:.3}",
                name, m.accuracy, m.macro_f1, m.balanced_accuracy
            );
        }
        if let Some(wf) = &stats.walk_forward {
            for (name, s) in &wf.models {
                println!(
                    "  walk-forward {:<3} macro_f1={:.3}±{:.3} over {} folds",
                    name, s.macro_f1_mean, s.macro_f1_std, s.folds
                );
            }
        }
    }

    let Some(last) = x.last() else {
        return Ok(());
    };
    let prediction = ensemble.predict(last)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}
