use std::{
    io::{self, BufReader},
    path::Path,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::Result;

use crate::{
    api::{
        backend::HttpBackend,
        push_channel::{PushHandle, PushSettings},
        rest::RestClient,
    },
    cli::{Cli, Command},
    console::{
        self,
        command,
        input::{spawn_line_reader, ConsoleInput},
        render, Step,
    },
    domain::{
        self,
        events::{EngineEvent, EventSink, PushEvent},
    },
    infra::{
        self,
        config::{AppConfig, FileConfigAdapter},
        contracts::ConfigAdapter,
        error::AppError,
    },
    usecases::{
        self, bootstrap,
        engine::{EngineBackend, InboxEngine},
    },
};

const ENGINE_QUEUE_CLOSED: &str = "ENGINE_QUEUE_CLOSED";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Everything the main loop reacts to, in arrival order.
#[derive(Debug)]
enum LoopInput {
    Engine(EngineEvent),
    Console(ConsoleInput),
}

/// Forwards background completions into the main loop queue.
struct ChannelSink {
    tx: Mutex<Sender<LoopInput>>,
}

impl ChannelSink {
    fn new(tx: Sender<LoopInput>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        let sent = match self.tx.lock() {
            Ok(tx) => tx.send(LoopInput::Engine(event)).is_ok(),
            Err(_) => false,
        };
        if !sent {
            tracing::debug!(code = ENGINE_QUEUE_CLOSED, "engine queue closed; event dropped");
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(
        domain = domain::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    match cli.command_or_default() {
        Command::Run => run_console(cli.config.as_deref()),
        Command::CheckConfig => check_config(cli.config.as_deref()),
    }
}

fn check_config(config_path: Option<&Path>) -> Result<()> {
    let adapter = FileConfigAdapter::new(config_path);
    let config = adapter.load()?;

    println!("# source: {}", adapter.describe());
    print!("{}", render_config(&config)?);
    config.validate()?;
    println!("# configuration is valid");
    Ok(())
}

fn render_config(config: &AppConfig) -> Result<String> {
    Ok(toml::to_string_pretty(&config.redacted())?)
}

fn run_console(config_path: Option<&Path>) -> Result<()> {
    let context = bootstrap::bootstrap(config_path)?;
    let config = &context.config;
    let agent_id = config.agent.agent_id.clone();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("inbox-sync-io")
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    let (tx, rx) = mpsc::channel();
    let sink: Arc<dyn EventSink> = Arc::new(ChannelSink::new(tx.clone()));
    let http = HttpBackend::new(
        RestClient::new(&config.server, &config.agent.access_token)?,
        runtime.handle().clone(),
        Arc::clone(&sink),
    );
    let push = PushHandle::spawn(
        PushSettings::from_config(config),
        runtime.handle(),
        Arc::clone(&sink),
    );

    let mut engine = InboxEngine::new(
        context.engine_settings(),
        EngineBackend {
            queries: Box::new(http.clone()),
            mutations: Box::new(http),
            push: Box::new(push),
        },
    );
    engine.start();

    let console_tx = tx;
    let _reader = spawn_line_reader(BufReader::new(io::stdin()), move |input| {
        console_tx.send(LoopInput::Console(input)).is_ok()
    })?;

    println!("Connected as {agent_id}. Type `help` for commands.");
    drive(&mut engine, &agent_id, &rx);

    engine.teardown();
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    tracing::info!("inbox console stopped");
    Ok(())
}

/// Single consumer of the loop queue. Returns when the console quits or its
/// input closes.
fn drive(engine: &mut InboxEngine, agent_id: &str, rx: &Receiver<LoopInput>) {
    for input in rx.iter() {
        match input {
            LoopInput::Engine(event) => {
                let before = engine.connection_status();
                let rerender = matches!(
                    event,
                    EngineEvent::ChatsFetched { .. } | EngineEvent::ConversationFetched { .. }
                );
                let summary = event_summary(&event);

                engine.handle_event(event);

                if let Some(summary) = summary {
                    println!("{summary}");
                }
                if engine.connection_status() != before {
                    println!("[{}]", render::connection_label(engine.connection_status()));
                }
                for notice in engine.drain_notices() {
                    println!("{}", render::notice_line(&notice));
                }
                if rerender {
                    print_lines(&console::snapshot_lines(engine, agent_id));
                }
            }
            LoopInput::Console(ConsoleInput::Line(line)) => match command::parse(&line) {
                Ok(Some(command)) => match console::execute(engine, agent_id, command) {
                    Step::Continue(lines) => print_lines(&lines),
                    Step::Quit => return,
                },
                Ok(None) => {}
                Err(error) => println!("{error}"),
            },
            LoopInput::Console(ConsoleInput::Closed) => return,
        }
    }
}

/// One-line heads-up for pushed messages.
fn event_summary(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::Push(PushEvent::NewMessage(message)) => {
            Some(format!("* new message in {}: {}", message.chat_id, message.preview()))
        }
        _ => None,
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
