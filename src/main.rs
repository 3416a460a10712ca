use std::{
    path::{
        Path,
        PathBuf,
    },
    process::ExitCode,
};

use clap::{
    Args,
    Parser,
    Subcommand,
    ValueEnum,
};
use kotoba_cards::{
    anki::migrate::{
        BatchItem,
        Preview,
        PreviewItem,
        MAX_BATCH_PREVIEW,
    },
    config::Settings,
    core::pipeline::DEFAULT_REPAIR_ATTEMPTS,
    export::{
        csv_filename,
        Priority,
    },
    logging,
    AppContext,
    CardError,
    CardType,
    DraftCard,
    GeneratedCard,
};
use serde::{
    de::DeserializeOwned,
    Serialize,
};
use tracing::{
    debug,
    info,
};

#[derive(Parser)]
#[command(
    name = "kotoba-cards",
    version,
    about = "Turn Japanese vocabulary drafts into checked Anki cards"
)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Generate cards from a JSON list of drafts")]
    Generate(GenerateArgs),

    #[command(about = "Generate one draft again as a specific card type")]
    Regenerate(RegenerateArgs),

    #[command(about = "Write previously generated cards to an Anki CSV file")]
    Export(ExportArgs),

    #[command(about = "Print the loaded card configuration")]
    Config {
        /// Bypass the cache and read the file again
        #[arg(long)]
        reload: bool,
    },

    #[command(subcommand, about = "Talk to Anki through AnkiConnect")]
    Anki(AnkiCommand),
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Core,
    Extra,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Core => Priority::Core,
            PriorityArg::Extra => Priority::Extra,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CardTypeArg {
    Word,
    Phrase,
    Sentence,
}

impl From<CardTypeArg> for CardType {
    fn from(arg: CardTypeArg) -> Self {
        match arg {
            CardTypeArg::Word => CardType::Word,
            CardTypeArg::Phrase => CardType::Phrase,
            CardTypeArg::Sentence => CardType::Sentence,
        }
    }
}

#[derive(Args)]
struct CsvArgs {
    /// Write CSV to this path instead of printing JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Source label or tag added to every card
    #[arg(long)]
    source: Option<String>,

    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,
}

#[derive(Args)]
struct GenerateArgs {
    /// JSON file holding a list of drafts
    #[arg(short, long)]
    input: PathBuf,

    #[arg(long, default_value_t = DEFAULT_REPAIR_ATTEMPTS)]
    repair_attempts: u32,

    #[command(flatten)]
    csv: CsvArgs,
}

#[derive(Args)]
struct RegenerateArgs {
    /// JSON file holding a single draft
    #[arg(short, long)]
    input: PathBuf,

    #[arg(long, value_enum)]
    card_type: CardTypeArg,

    #[arg(long, default_value_t = DEFAULT_REPAIR_ATTEMPTS)]
    repair_attempts: u32,
}

#[derive(Args)]
struct ExportArgs {
    /// JSON file holding generated cards
    #[arg(long)]
    cards: PathBuf,

    /// Base name for the CSV file when --output is not given
    #[arg(long)]
    name: Option<String>,

    #[command(flatten)]
    csv: CsvArgs,
}

#[derive(Subcommand)]
enum AnkiCommand {
    #[command(about = "Check that AnkiConnect answers with a supported version")]
    Check,

    #[command(about = "List decks holding notes of the old note type")]
    Decks,

    #[command(about = "List old notes in a deck")]
    Notes {
        #[arg(long)]
        deck: String,
    },

    #[command(about = "Preview the migrated card for one note")]
    Preview {
        #[arg(long)]
        note_id: u64,
    },

    #[command(about = "Preview the first notes of a deck")]
    PreviewBatch {
        #[arg(long)]
        deck: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    #[command(about = "Write an approved preview back to Anki")]
    Approve {
        /// JSON file holding a preview as printed by `anki preview`
        #[arg(long)]
        preview: PathBuf,

        /// Replace the card type tag; defaults to the classified type
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CardError> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CardError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn write_cards(
    context: &AppContext,
    cards: &[GeneratedCard],
    csv: &CsvArgs,
    default_path: Option<PathBuf>,
) -> Result<(), CardError> {
    match csv.output.clone().or(default_path) {
        Some(path) => {
            let text = context
                .export_csv(cards, csv.source.as_deref(), csv.priority.map(Priority::from))
                .await?;
            tokio::fs::write(&path, text).await?;
            info!(cards = cards.len(), path = %path.display(), "wrote CSV");
            Ok(())
        }
        None => print_json(cards),
    }
}

async fn run_anki(context: &AppContext, command: AnkiCommand) -> Result<(), CardError> {
    match command {
        AnkiCommand::Check => {
            let version = context.anki.get().await.check_connection().await?;
            println!("AnkiConnect version {version}");
        }
        AnkiCommand::Decks => print_json(&context.migrator().await.decks().await?)?,
        AnkiCommand::Notes { deck } => print_json(&context.migrator().await.notes(&deck).await?)?,
        AnkiCommand::Preview { note_id } => {
            let migrator = context.migrator().await;
            let note = migrator.note(note_id).await?;
            let item = PreviewItem::from_note(&note, &context.settings.migration.field_mapping);
            let config = context.config.load().await?;
            print_json(&migrator.preview(&item, &config).await?)?;
        }
        AnkiCommand::PreviewBatch { deck, limit } => {
            let migrator = context.migrator().await;
            let mapping = &context.settings.migration.field_mapping;
            let items: Vec<PreviewItem> = migrator
                .notes(&deck)
                .await?
                .iter()
                .take(limit.min(MAX_BATCH_PREVIEW))
                .map(|note| PreviewItem::from_note(note, mapping))
                .collect();
            let config = context.config.load().await?;
            let batch = migrator.preview_batch(&items, &config).await?;
            info!(succeeded = batch.succeeded(), total = batch.items.len(), outcome = ?batch.outcome(), "batch preview done");

            let ready: Vec<&Preview> = batch
                .items
                .iter()
                .filter_map(|item| match item {
                    BatchItem::Ready(preview) => Some(preview),
                    BatchItem::Failed { note_id, message } => {
                        eprintln!("note {note_id}: {message}");
                        None
                    }
                })
                .collect();
            print_json(&ready)?;
        }
        AnkiCommand::Approve { preview, tags } => {
            let preview: Preview = read_json(&preview).await?;
            let tags = if tags.is_empty() {
                vec![preview.auto_classified_type.to_string()]
            } else {
                tags
            };
            context
                .migrator()
                .await
                .approve(preview.note_id, &preview.new_fields, &tags)
                .await?;
            println!("note {} migrated", preview.note_id);
        }
    }
    Ok(())
}

async fn run(context: &AppContext, command: Commands) -> Result<(), CardError> {
    match command {
        Commands::Generate(args) => {
            let drafts: Vec<DraftCard> = read_json(&args.input).await?;
            let cards = context.generate(&drafts, args.repair_attempts).await?;
            write_cards(context, &cards, &args.csv, None).await
        }
        Commands::Regenerate(args) => {
            let draft: DraftCard = read_json(&args.input).await?;
            let card = context
                .regenerate(&draft, args.card_type.into(), args.repair_attempts)
                .await?;
            print_json(&card)
        }
        Commands::Export(args) => {
            let cards: Vec<GeneratedCard> = read_json(&args.cards).await?;
            let default_path = PathBuf::from(csv_filename(args.name.as_deref()));
            write_cards(context, &cards, &args.csv, Some(default_path)).await
        }
        Commands::Config { reload } => {
            let config = if reload {
                context.config.reload().await?
            } else {
                context.config.load().await?
            };
            print_json(config.as_ref())
        }
        Commands::Anki(command) => run_anki(context, command).await,
    }
}

fn fail(error: &CardError) -> ExitCode {
    debug!(error = %error, kind = ?error.kind(), "command failed");
    eprintln!("{}", error.public_message());
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(cli.verbose);
            return fail(&CardError::from(e));
        }
    };
    logging::init(settings.debug || cli.verbose);

    let context = AppContext::from_settings(settings);
    let result = run(&context, cli.command).await;
    context.anki.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}
