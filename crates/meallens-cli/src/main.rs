use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use meallens_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use meallens_contracts::events::EventLog;
use meallens_contracts::foods::{
    split_and_clean, AddOutcome, EntryId, MealSlotSet, RegistrationOutcome,
};
use meallens_engine::vision::{
    normalize_api_base, openai_api_base, DEFAULT_LANGUAGE, DEFAULT_MAX_TOKENS,
    DEFAULT_VISION_MODEL,
};
use meallens_engine::{
    load_upload, preprocess_image, ClassifierConfig, EngineConfig, HttpMealRegistrar,
    MealEngine, MealRegistrar, OpenAiVisionClient, PreprocessOptions, VisionClassifier,
    DEFAULT_NUTRITION_URL, DEFAULT_SERVER_URL,
};

mod view;

use view::{format_outcome, render_session};

#[derive(Debug, Parser)]
#[command(name = "meallens", version, about = "Log meals from food photos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: upload, analyze, correct, register.
    Chat(ChatArgs),
    /// Print the foods the vision model sees in one photo.
    Analyze(AnalyzeArgs),
    /// Register a single food for a meal slot.
    Register(RegisterArgs),
}

#[derive(Debug, Args)]
struct ClassifierArgs {
    #[arg(long, env = "MEALLENS_VISION_MODEL", default_value = DEFAULT_VISION_MODEL)]
    model: String,
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    language: String,
    /// Defaults to OPENAI_API_BASE, then OPENAI_BASE_URL, then api.openai.com.
    #[arg(long)]
    api_base: Option<String>,
    /// Seconds to wait for the model. Waits indefinitely when omitted.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl ClassifierArgs {
    fn config(&self) -> ClassifierConfig {
        ClassifierConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            language: self.language.clone(),
            api_base: self
                .api_base
                .as_deref()
                .map(normalize_api_base)
                .unwrap_or_else(openai_api_base),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Args)]
struct ServerArgs {
    #[arg(long, env = "MEALLENS_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,
    /// Offer the snack slot next to breakfast, lunch and dinner.
    #[arg(long)]
    with_snack: bool,
}

impl ServerArgs {
    fn slot_set(&self) -> MealSlotSet {
        if self.with_snack {
            MealSlotSet::WithSnack
        } else {
            MealSlotSet::Standard
        }
    }
}

#[derive(Debug, Args)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Photo to upload before the first prompt.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, env = "MEALLENS_NUTRITION_URL", default_value = DEFAULT_NUTRITION_URL)]
    nutrition_url: String,
    #[command(flatten)]
    classifier: ClassifierArgs,
    #[command(flatten)]
    server: ServerArgs,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[command(flatten)]
    classifier: ClassifierArgs,
}

#[derive(Debug, Args)]
struct RegisterArgs {
    #[arg(long)]
    food: String,
    /// 아침/점심/저녁(/간식), breakfast/lunch/dinner(/snack), or 1-based number.
    #[arg(long)]
    slot: String,
    #[command(flatten)]
    server: ServerArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("meallens error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Analyze(args) => run_analyze(args),
        Command::Register(args) => run_register(args),
    }
}

fn warn_if_missing_key(client: &OpenAiVisionClient) {
    if !client.has_api_key() {
        eprintln!("warning: OPENAI_API_KEY is not set; photo analysis will fail until it is.");
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));

    let classifier = OpenAiVisionClient::from_env(args.classifier.config())?;
    warn_if_missing_key(&classifier);
    let registrar = HttpMealRegistrar::new(&args.server.server_url)?;
    let config = EngineConfig {
        slot_set: args.server.slot_set(),
        preprocess: PreprocessOptions::default(),
        nutrition_url: args.nutrition_url.clone(),
    };
    let mut engine = MealEngine::new(
        EventLog::open_with_random_session(&events_path)?,
        Box::new(classifier),
        Box::new(registrar),
        config,
    );

    if let Some(image) = args.image {
        if let Err(err) = engine.upload(image) {
            eprintln!("error: {err:#}");
        }
    }
    report_log_failures(&mut engine);

    println!("MealLens started. Type /help for commands; plain text adds a food.");
    print!("{}", render_session(engine.session(), engine.slot_set()));

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent.action == "noop" {
            continue;
        }
        match handle_intent(&mut engine, &intent) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Redraw) => print!("{}", render_session(engine.session(), engine.slot_set())),
            Ok(Flow::Stay) => {}
            Err(err) => eprintln!("error: {err:#}"),
        }
        report_log_failures(&mut engine);
    }
    Ok(())
}

fn report_log_failures(engine: &mut MealEngine) {
    for failure in engine.take_log_failures() {
        eprintln!("warning: event not logged: {failure}");
    }
}

/// What the loop does after a handler returns. Every committed mutation asks
/// for a redraw so the screen always reflects the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Stay,
    Redraw,
    Quit,
}

fn entry_id(intent: &Intent) -> Result<EntryId> {
    let raw = intent
        .arg("id")
        .with_context(|| format!("{} needs an entry id", intent.raw.trim()))?;
    Ok(raw.parse::<EntryId>()?)
}

fn handle_intent(engine: &mut MealEngine, intent: &Intent) -> Result<Flow> {
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join("  "));
            println!("Any line without a leading / is added to the manual list.");
            Ok(Flow::Stay)
        }
        "show" => Ok(Flow::Redraw),
        "quit" => Ok(Flow::Quit),
        "upload" => {
            let path = intent.arg("path").context("/upload requires a path")?;
            let (width, height) = engine.upload(path)?;
            println!("Photo ready ({width}x{height}). Run /analyze.");
            Ok(Flow::Redraw)
        }
        "analyze" => {
            println!("Analyzing photo...");
            let entries = engine.analyze()?;
            if entries.is_empty() {
                println!("The model did not name any food.");
            } else {
                println!("Detected {} food(s).", entries.len());
            }
            Ok(Flow::Redraw)
        }
        "add_manual" => {
            let name = intent.arg("name").unwrap_or_default();
            match engine.add_manual(name) {
                AddOutcome::Added(_) => Ok(Flow::Redraw),
                AddOutcome::Blank => Ok(Flow::Stay),
                AddOutcome::Duplicate => {
                    println!("{name} is already in the manual list.");
                    Ok(Flow::Stay)
                }
            }
        }
        "begin_edit" => {
            let id = entry_id(intent)?;
            let (_, name) = engine.begin_edit(id)?;
            println!("Editing {id} {name}.");
            Ok(Flow::Redraw)
        }
        "save_edit" => {
            let id = entry_id(intent)?;
            let name = intent.arg("name").context("/save requires a new name")?;
            let previous = engine.save_edit(id, name)?;
            println!("Renamed {previous} to {name}.");
            Ok(Flow::Redraw)
        }
        "cancel_edit" => {
            engine.cancel_edit(entry_id(intent)?)?;
            Ok(Flow::Redraw)
        }
        "delete" => {
            let removed = engine.delete(entry_id(intent)?)?;
            println!("Removed {}.", removed.name);
            Ok(Flow::Redraw)
        }
        "register" => {
            let id = entry_id(intent)?;
            let slot_text = intent.arg("slot").context("/register requires a meal slot")?;
            let slot = engine
                .slot_set()
                .parse(slot_text)
                .with_context(|| format!("unknown meal slot '{slot_text}'"))?;
            let name = engine
                .session()
                .find(id)
                .map(|(_, name)| name.to_string())
                .unwrap_or_default();
            let outcome = engine.register(id, slot)?;
            let message = format_outcome(&name, slot, &outcome);
            match outcome {
                RegistrationOutcome::Failed { .. } => eprintln!("{message}"),
                _ => println!("{message}"),
            }
            Ok(Flow::Stay)
        }
        "proceed" => {
            let url = engine.proceed();
            println!("Session cleared. Continue with nutrition analysis at {url}");
            Ok(Flow::Redraw)
        }
        "unknown" => {
            println!(
                "Unknown command /{}. Type /help.",
                intent.arg("command").unwrap_or_default()
            );
            Ok(Flow::Stay)
        }
        _ => Ok(Flow::Stay),
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let classifier = OpenAiVisionClient::from_env(args.classifier.config())?;
    warn_if_missing_key(&classifier);
    let image = load_upload(&args.image)?;
    let prepared = preprocess_image(&image, &PreprocessOptions::default())?;
    match classifier.classify(&prepared.bytes) {
        Ok(text) => {
            for name in split_and_clean(&text) {
                println!("{name}");
            }
            Ok(0)
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(1)
        }
    }
}

fn run_register(args: RegisterArgs) -> Result<i32> {
    let slot_set = args.server.slot_set();
    let slot = slot_set
        .parse(&args.slot)
        .with_context(|| format!("unknown meal slot '{}'", args.slot))?;
    let food = args.food.trim();
    if food.is_empty() {
        anyhow::bail!("--food must not be blank");
    }
    let registrar = HttpMealRegistrar::new(&args.server.server_url)?;
    let outcome = registrar.register(food, slot);
    let message = format_outcome(food, slot, &outcome);
    Ok(match outcome {
        RegistrationOutcome::Registered => {
            println!("{message}");
            0
        }
        RegistrationOutcome::Duplicate { .. } => {
            println!("{message}");
            2
        }
        RegistrationOutcome::Failed { .. } => {
            eprintln!("{message}");
            1
        }
    })
}
