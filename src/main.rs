//! Protoref CLI - proto compilation extraction and textproto indexing

use clap::{Parser, Subcommand};
use protoref::analyzer::TEXTPROTO_LANGUAGE;
use protoref::{
    paths, GraphRecorder, PathSubstitution, ProtoExtractor, SchemaPool, SourceTree,
    TextprotoAnalyzer, VNameRules,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "protoref")]
#[command(version = "0.1.0")]
#[command(about = "Protobuf schema extraction and textproto cross-reference indexing")]
#[command(long_about = r#"
Protoref produces a semantic cross-reference graph from protobuf schemas
and the textproto files written against them:

  protoref extract -I proto/ --corpus myrepo service.proto
      Resolve the transitive import closure and write a self-contained,
      content-addressed compilation record.

  protoref analyze -I proto/ --message-name cfg.Config \
      --textproto deploy.textproto service.proto
      Index one textproto instance: an anchor and a ref edge for every
      field occurrence, linked to the schema element it names.
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a compilation record for a set of .proto files
    Extract {
        /// Top-level .proto files to extract
        #[arg(required = true)]
        protos: Vec<String>,

        /// Include root, as `dir` or `prefix=dir` (colon-separated lists allowed)
        #[arg(short = 'I', long = "proto_path")]
        proto_path: Vec<String>,

        /// Corpus assigned to files no identity rule claims
        #[arg(long)]
        corpus: Option<String>,

        /// Directory recorded paths are made relative to
        #[arg(long)]
        root_directory: Option<String>,

        /// Identity-rule configuration file (JSON)
        #[arg(long)]
        vnames: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Index one textproto file against its schema
    Analyze {
        /// .proto files defining the schema
        #[arg(required = true)]
        protos: Vec<String>,

        /// The textproto file to index
        #[arg(long)]
        textproto: PathBuf,

        /// Fully-qualified name of the textproto's root message type
        #[arg(long)]
        message_name: String,

        /// Include root, as `dir` or `prefix=dir` (colon-separated lists allowed)
        #[arg(short = 'I', long = "proto_path")]
        proto_path: Vec<String>,

        /// Corpus assigned to files no identity rule claims
        #[arg(long)]
        corpus: Option<String>,

        /// Identity-rule configuration file (JSON)
        #[arg(long)]
        vnames: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Extract {
            protos,
            proto_path,
            corpus,
            root_directory,
            vnames,
            output,
        } => {
            // Environment configuration first, flags override.
            let mut extractor = ProtoExtractor::from_env()?;
            if let Some(corpus) = corpus {
                extractor.corpus = corpus;
            }
            if let Some(root) = root_directory {
                extractor.root_directory = root;
            }
            if let Some(rules_path) = vnames {
                extractor.rules = VNameRules::from_file(&rules_path)?;
            }
            if !proto_path.is_empty() {
                extractor.substitutions = parse_substitution_flags(&proto_path);
            }

            let record = extractor.extract(&protos)?;
            let mut json = serde_json::to_string_pretty(&record)?;
            json.push('\n');
            write_output(output.as_deref(), json.as_bytes())?;

            tracing::info!(
                "compilation record: {} source file(s), {} required input(s)",
                record.source_files.len(),
                record.required_inputs.len()
            );
        }

        Commands::Analyze {
            protos,
            textproto,
            message_name,
            proto_path,
            corpus,
            vnames,
            output,
        } => {
            for proto in &protos {
                if !proto.ends_with(".proto") {
                    anyhow::bail!("not a .proto file: {}", proto);
                }
            }

            // The current directory itself is always a resolvable root.
            let mut substitutions = vec![PathSubstitution::new("", "")];
            substitutions.extend(parse_substitution_flags(&proto_path));
            let tree = SourceTree::new(substitutions);
            let pool = SchemaPool::build(tree, &protos)?;

            let rules = match vnames {
                Some(rules_path) => VNameRules::from_file(&rules_path)?,
                None => VNameRules::default(),
            };
            let corpus = corpus.unwrap_or_default();
            let content = fs::read_to_string(&textproto)?;

            let analyzer = TextprotoAnalyzer::new(&pool, &rules, &corpus, TEXTPROTO_LANGUAGE);
            let mut recorder = GraphRecorder::new();
            analyzer.analyze(
                &textproto.to_string_lossy(),
                &content,
                &message_name,
                &mut recorder,
            )?;

            // Serialized only now that the whole analysis succeeded.
            let mut buffer = Vec::new();
            recorder.write_json(&mut buffer)?;
            write_output(output.as_deref(), &buffer)?;

            tracing::info!(
                "indexed {}: {} graph entries",
                textproto.display(),
                recorder.len()
            );
        }
    }

    Ok(())
}

// Each -I value is `dir` or `prefix=dir`, possibly colon-separated; reuse the
// compiler-argument parser so the CLI and a record's argument echo agree.
fn parse_substitution_flags(values: &[String]) -> Vec<PathSubstitution> {
    let tokens: Vec<String> = values
        .iter()
        .map(|value| format!("--proto_path={}", value))
        .collect();
    paths::parse_path_substitutions(&tokens, None)
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match path {
        Some(path) => fs::write(path, bytes)?,
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}
