use anyhow::{Context as AnyhowContext, Result};
use axum::{
    body::Body,
    extract::Path as UrlPath,
    http::{HeaderMap, Response as HttpResponse, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use command::{classify_error, CommandHandler, CommandRequest, CommandResponse, ResponseMeta};
use covenant_blocks::render::{interactive_view, plain_text, print_html, PrintOptions};
use covenant_blocks::{storage, outstanding, PartyId, Reconciler, Scanner};
use covenant_protocol::serialize_json;
use covenant_workflow::{
    ContractService, CurrentUser, DrafterMode, StoreBackend, WorkflowConfig,
};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

mod command;
mod http_api;
mod serve_guard;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "covenant")]
#[command(about = "Draft, sign and finalize contracts with bound signature fields", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "COVENANT_CONFIG")]
    config: Option<PathBuf>,

    /// Contract store directory (overrides config and COVENANT_STORE_DIR)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Contract store backend
    #[arg(long, global = true, value_enum)]
    store_backend: Option<StoreBackendArg>,

    /// Drafter backend (overrides COVENANT_DRAFTER_MODE)
    #[arg(long, global = true, value_enum)]
    drafter: Option<DrafterArg>,

    /// Acting user id when a request carries none
    #[arg(long, global = true, env = "COVENANT_USER_ID")]
    user_id: Option<String>,

    /// Acting user email when a request carries none
    #[arg(long, global = true, env = "COVENANT_USER_EMAIL")]
    user_email: Option<String>,

    /// Acting user display name
    #[arg(long, global = true, env = "COVENANT_USER_NAME")]
    user_name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a JSON Command API request
    Command(CommandArgs),

    /// Serve Command API over HTTP (POST /command)
    ServeHttp(ServeArgs),

    /// Report placeholder runs found in a text
    Scan(ScanArgs),

    /// Render a stored document blob without a contract store
    Render(RenderArgs),
}

#[derive(Args)]
struct CommandArgs {
    /// Inline JSON payload (mutually exclusive with --file)
    #[arg(long, conflicts_with = "file")]
    json: Option<String>,

    /// Path to file containing JSON payload
    #[arg(long)]
    file: Option<PathBuf>,

    /// Pretty-print JSON response
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:7700
    #[arg(long, default_value = "127.0.0.1:7700")]
    bind: String,

    /// Allow binding to non-loopback addresses (requires --auth-token)
    #[arg(long)]
    public: bool,

    /// Require Authorization: Bearer <token> on all requests (env: COVENANT_AUTH_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,
}

#[derive(Args)]
struct ScanArgs {
    /// Text file to scan (stdin when omitted)
    path: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct RenderArgs {
    /// Stored document blob (`{"blocks": [...], "unknowns": [...]}`)
    path: PathBuf,

    #[arg(long, value_enum, default_value = "plain")]
    view: ViewArg,

    /// Party the interactive view is rendered for
    #[arg(long, value_enum, default_value = "originator")]
    viewer: PartyArg,

    /// Title in the print header
    #[arg(long, default_value = "Contract")]
    title: String,

    /// Contract id in the print header
    #[arg(long, default_value = "draft")]
    id: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreBackendArg {
    File,
    Memory,
}

#[derive(Clone, Copy, ValueEnum)]
enum DrafterArg {
    Openai,
    Stub,
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Plain,
    Print,
    Interactive,
}

#[derive(Clone, Copy, ValueEnum)]
enum PartyArg {
    Originator,
    Counterparty,
}

impl From<PartyArg> for PartyId {
    fn from(value: PartyArg) -> Self {
        match value {
            PartyArg::Originator => Self::Originator,
            PartyArg::Counterparty => Self::Counterparty,
        }
    }
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // Commands whose stdout is JSON keep logs at warn
    if matches!(cli.command, Commands::Command(_) | Commands::Scan(_)) {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // reqwest and hyper are chatty at debug
    if !cli.verbose {
        builder.filter_module("hyper", log::LevelFilter::Warn);
        builder.filter_module("reqwest", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = load_config(&cli)?;
    let default_user = default_user(&cli);

    match cli.command {
        Commands::Command(args) => run_command(args, &config, default_user).await?,
        Commands::ServeHttp(args) => serve_http(args, &config, default_user).await?,
        Commands::Scan(args) => run_scan(args, &config)?,
        Commands::Render(args) => run_render(args, &config)?,
    }

    Ok(())
}

/// File, then environment, then flags. Validation is left to the commands
/// that wire collaborators.
fn load_config(cli: &Cli) -> Result<WorkflowConfig> {
    let mut config = match &cli.config {
        Some(path) => WorkflowConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => WorkflowConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());

    if let Some(dir) = &cli.store_dir {
        config.store.dir = dir.clone();
    }
    if let Some(backend) = cli.store_backend {
        config.store.backend = match backend {
            StoreBackendArg::File => StoreBackend::File,
            StoreBackendArg::Memory => StoreBackend::Memory,
        };
    }
    if let Some(drafter) = cli.drafter {
        config.drafter.mode = match drafter {
            DrafterArg::Openai => DrafterMode::Openai,
            DrafterArg::Stub => DrafterMode::Stub,
        };
    }
    Ok(config)
}

fn default_user(cli: &Cli) -> Option<CurrentUser> {
    let id = cli.user_id.as_deref()?.trim();
    let email = cli.user_email.as_deref()?.trim();
    if id.is_empty() || email.is_empty() {
        return None;
    }
    Some(CurrentUser::new(
        id,
        email,
        cli.user_name.as_deref().unwrap_or_default(),
    ))
}

fn build_handler(config: &WorkflowConfig, default_user: Option<CurrentUser>) -> Result<CommandHandler> {
    let service = ContractService::from_config(config)?;
    Ok(CommandHandler::new(Arc::new(service), default_user))
}

async fn run_command(
    args: CommandArgs,
    config: &WorkflowConfig,
    default_user: Option<CurrentUser>,
) -> Result<()> {
    let raw = read_payload(&args)?;
    let request: CommandRequest =
        serde_json::from_str(&raw).context("Invalid JSON passed to --json/--file")?;

    let response = match build_handler(config, default_user) {
        Ok(handler) => handler.execute(request).await,
        Err(err) => CommandResponse::error(
            classify_error(&err),
            ResponseMeta {
                action: Some(request.action.as_str().to_string()),
                ..Default::default()
            },
        ),
    };

    let output = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serialize_json(&response)?
    };
    print_stdout(&output)?;

    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

fn read_payload(args: &CommandArgs) -> Result<String> {
    if let Some(raw) = &args.json {
        return Ok(raw.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON from {}", path.display()));
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read JSON from stdin")?;

    if buffer.trim().is_empty() {
        anyhow::bail!("Command request is empty. Provide --json, --file, or pipe JSON via stdin.");
    }

    Ok(buffer)
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn run_scan(args: ScanArgs, config: &WorkflowConfig) -> Result<()> {
    let scanner = Scanner::new(config.markers.clone())?;
    let text = read_input(args.path.as_ref())?;
    let markers = scanner.scan(&text);
    let signatures = markers.iter().filter(|m| m.is_signature()).count();

    let report = serde_json::json!({
        "signatures": signatures,
        "fill_ins": markers.len() - signatures,
        "markers": markers,
    });
    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serialize_json(&report)?
    };
    print_stdout(&output)
}

fn run_render(args: RenderArgs, config: &WorkflowConfig) -> Result<()> {
    let reconciler = Reconciler::new(Scanner::new(config.markers.clone())?);
    let blob = fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let doc = storage::decode(&reconciler, &blob)
        .with_context(|| format!("Invalid document blob {}", args.path.display()))?;

    let output = match args.view {
        ViewArg::Plain => plain_text(&doc),
        ViewArg::Print => {
            let options = PrintOptions::new(&args.id).title(&args.title);
            print_html(reconciler.scanner(), &doc, &options)?
        }
        ViewArg::Interactive => {
            let viewer = PartyId::from(args.viewer);
            let blocks = interactive_view(reconciler.scanner(), &doc, viewer)?;
            serde_json::to_string_pretty(&serde_json::json!({
                "viewer": viewer,
                "blocks": blocks,
                "outstanding": outstanding(&doc),
            }))?
        }
    };
    print_stdout(&output)
}

async fn serve_http(
    args: ServeArgs,
    config: &WorkflowConfig,
    default_user: Option<CurrentUser>,
) -> Result<()> {
    let guard =
        serve_guard::ServeGuard::check(&args.bind, args.public, args.auth_token.as_deref())
            .await?;

    let handler = build_handler(config, default_user)?.without_local_output();
    let state = Arc::new(HttpState { handler, guard });
    let app = Router::new()
        .route(
            "/command",
            post({
                let state = state.clone();
                move |headers, body| http_handler(headers, body, state.clone())
            }),
        )
        .route(
            "/contracts/:id/pdf",
            get({
                let state = state.clone();
                move |headers, id| http_pdf(headers, id, state.clone())
            }),
        )
        .route(
            "/health",
            get({
                let state = state.clone();
                move |headers| http_health(headers, state.clone())
            }),
        );

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    log::info!(
        "Serving with drafter={} store={} auth={}",
        state.handler.service().drafter_id(),
        config.store.dir.display(),
        state.guard.requires_token()
    );
    print_stdout(&format!("Serving Command API: {base_url}/command"))?;
    print_stdout(&format!("Contract PDFs: {base_url}/contracts/<id>/pdf"))?;
    print_stdout(&format!("Health endpoint: {base_url}/health"))?;

    for line in state.guard.banner() {
        print_stdout(&line)?;
    }

    print_stdout(&format!("Try: curl {base_url}/health"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn unauthorized() -> Result<Response, StatusCode> {
    let response = http_api::error_response(
        "unauthorized",
        "Missing or invalid Authorization header".to_string(),
    );
    http_api::build_response(StatusCode::UNAUTHORIZED, response)
}

fn authorized(headers: &HeaderMap, state: &HttpState) -> bool {
    state.guard.admits(headers)
}

async fn http_handler(
    headers: HeaderMap,
    body: axum::body::Bytes,
    state: Arc<HttpState>,
) -> Result<Response, StatusCode> {
    if !authorized(&headers, &state) {
        return unauthorized();
    }

    let mut request: CommandRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let response =
                http_api::error_response("invalid_request", format!("Invalid JSON request: {err}"));
            return http_api::build_response(StatusCode::BAD_REQUEST, response);
        }
    };
    if request.user.is_none() {
        request.user = http_api::user_from_headers(&headers);
    }
    let response = state.handler.execute(request).await;
    http_api::build_response(StatusCode::OK, response)
}

async fn http_pdf(
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    state: Arc<HttpState>,
) -> Result<Response, StatusCode> {
    if !authorized(&headers, &state) {
        return unauthorized();
    }

    let Some(user) = http_api::user_from_headers(&headers).or_else(|| state.handler.default_user())
    else {
        let response = http_api::error_response(
            "missing_user",
            "No acting user for this download".to_string(),
        );
        return http_api::build_response(StatusCode::BAD_REQUEST, response);
    };

    match state.handler.service().export(&user, &id).await {
        Ok(pdf) => http_api::pdf_response(&headers, pdf),
        Err(err) => {
            let envelope = classify_error(&anyhow::Error::from(err));
            let status = http_api::status_for_code(&envelope.code);
            http_api::build_response(status, CommandResponse::error(envelope, ResponseMeta::default()))
        }
    }
}

async fn http_health(headers: HeaderMap, state: Arc<HttpState>) -> Result<Response, StatusCode> {
    if !authorized(&headers, &state) {
        return unauthorized();
    }

    let report = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "drafter": state.handler.service().drafter_id(),
    });
    let bytes = serde_json::to_vec(&report).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    HttpResponse::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

struct HttpState {
    handler: CommandHandler,
    guard: serve_guard::ServeGuard,
}
