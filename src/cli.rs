use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use crate::model::{FeatureType, LoadedModel, OutputTask};

#[derive(Parser, Debug)]
#[command(name = "lambda-api")]
#[command(version)]
#[command(about = "Serverless model prediction endpoint", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml, <APP_ENV>.toml)
    #[arg(short, long, default_value = "config", global = true)]
    pub config: PathBuf,

    /// Override the configured artifact reference
    #[arg(short, long, env = "MODEL_REFERENCE", global = true)]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the AWS Lambda runtime loop (default)
    Lambda,
    /// Serve predictions over local HTTP
    Serve {
        /// Listen port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Load the model before accepting traffic
        #[arg(long)]
        warm: bool,
    },
    /// Run a single prediction and print the invocation result
    Predict {
        /// Request body as JSON
        #[arg(short, long, conflicts_with = "event")]
        body: Option<String>,
        /// File holding a full invocation event
        #[arg(short, long)]
        event: Option<PathBuf>,
    },
    /// Load the artifact and print its schema
    Inspect {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// One row of the `inspect` schema table
#[derive(Debug, Serialize, Tabled)]
pub struct FeatureRow {
    pub position: usize,
    pub name: String,
    #[tabled(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub encoding: String,
}

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub version: String,
    pub format: String,
    pub input_dim: usize,
    pub output_dim: usize,
    pub output: String,
    pub features: Vec<FeatureRow>,
}

pub fn summarize(model: &LoadedModel) -> ModelSummary {
    let features = model
        .schema()
        .features
        .iter()
        .enumerate()
        .map(|(position, spec)| FeatureRow {
            position,
            name: spec.name.clone(),
            kind: spec.kind.name().to_string(),
            required: spec.is_required(),
            encoding: match &spec.kind {
                FeatureType::Numeric => "value".to_string(),
                FeatureType::Categorical { categories } => {
                    format!("one-hot [{}]", categories.join(", "))
                }
                FeatureType::String => "not encoded".to_string(),
            },
        })
        .collect();

    let output = match &model.output_spec().task {
        OutputTask::Binary { labels, threshold } => {
            format!("binary {} @ {}", labels.join(" / "), threshold)
        }
        OutputTask::Multiclass { labels } => format!("multiclass [{}]", labels.join(", ")),
        OutputTask::Regression { name } => {
            format!("regression {}", name.as_deref().unwrap_or("value"))
        }
    };

    ModelSummary {
        id: model.descriptor().id.clone(),
        version: model.descriptor().version.clone(),
        format: model.format().to_string(),
        input_dim: model.input_dim(),
        output_dim: model.output_dim(),
        output,
        features,
    }
}

pub fn print_summary(summary: &ModelSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!(
        "{} v{} ({}, {} -> {})",
        summary.id, summary.version, summary.format, summary.input_dim, summary.output_dim
    );
    println!("output: {}", summary.output);
    if summary.features.is_empty() {
        println!("(no features)");
    } else {
        println!("{}", Table::new(&summary.features));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelArtifact;
    use serde_json::json;

    #[test]
    fn test_defaults_to_lambda_mode() {
        let cli = Cli::parse_from(["lambda-api"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config"));

        let cli = Cli::parse_from(["lambda-api", "serve", "--port", "9000"]);
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9000), warm: false })));
    }

    #[test]
    fn test_predict_body_and_event_conflict() {
        let parsed = Cli::try_parse_from([
            "lambda-api", "predict", "--body", "{}", "--event", "event.json",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_summarize() {
        let artifact = ModelArtifact::from_bytes(
            json!({
                "id": "churn",
                "version": "3",
                "format": "dense_json",
                "schema": {"features": [
                    {"name": "plan", "type": "categorical", "categories": ["free", "pro"]},
                    {"name": "seats", "type": "numeric", "default": 1}
                ]},
                "output": {"kind": "binary", "labels": ["stay", "churn"]},
                "network": {"input_dim": 3, "layers": [
                    {"weights": [[0.1, 0.2, 0.3]], "bias": [0.0], "activation": "sigmoid"}
                ]}
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        let model = LoadedModel::from_artifact(artifact).unwrap();
        let summary = summarize(&model);

        assert_eq!(summary.input_dim, 3);
        assert_eq!(summary.features[0].encoding, "one-hot [free, pro]");
        assert!(!summary.features[1].required);
        assert!(summary.output.starts_with("binary stay / churn"));
    }
}
