mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use templater::{Child, Node, TemplateDiagnostic, TemplateError};
use views::{Views, ViewsConfig};

#[derive(Parser)]
#[command(name = "templater", version, about = "Hierarchical HTML template compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log verbosity (-v: debug, -vv: trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a view to stdout
    Render(RenderArgs),

    /// Run .test.html test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// View name (e.g. pages.home) or path to a view file
    view: String,

    /// Views directory. Defaults to the view file's directory, or "."
    #[arg(long)]
    views: Option<PathBuf>,

    /// Override the maximum nesting depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Parse only, don't compile (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Dump the resolved node tree
    #[arg(long)]
    tree: bool,

    /// List named blocks of the resolved tree
    #[arg(long)]
    list_blocks: bool,

    /// Suppress output (just check for errors)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.html file or directory containing them
    path: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Render(render_args) => do_render(render_args, cli.no_color),
        Command::Test(test_args) => {
            let exit_code = test_runner::run_tests(&test_args.path, cli.no_color);
            process::exit(exit_code);
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Split the CLI view argument into a views root and a view name.
fn resolve_view(view: &str, views_dir: Option<PathBuf>, extension: &str) -> (PathBuf, String) {
    let path = Path::new(view);
    if views_dir.is_none() && path.is_file() {
        let root = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(view)
            .to_string();
        return (root, name);
    }

    let root = views_dir.unwrap_or_else(|| PathBuf::from("."));
    let suffix = format!(".{}", extension);
    let name = view.strip_suffix(&suffix).unwrap_or(view).to_string();
    (root, name)
}

fn do_render(args: RenderArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();

    let probe_root = args
        .views
        .clone()
        .or_else(|| Path::new(&args.view).parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    let mut views_config = match ViewsConfig::load_dir(&probe_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    if let Some(max_depth) = args.max_depth {
        views_config.max_depth = max_depth;
    }

    let (root, name) = resolve_view(&args.view, args.views.clone(), &views_config.extension);
    let mut views = Views::configured(&root, views_config);

    let parsed = match views.parse(&name) {
        Ok(p) => p,
        Err(error) => {
            emit_error(&writer, &config, views.files(), &error);
            process::exit(1);
        }
    };
    emit_diagnostics(&writer, &config, views.files(), &parsed.warnings);

    // --check: parse succeeded, exit
    if args.check {
        eprintln!("ok: {} parsed successfully", name);
        return;
    }

    // --tree: dump resolved tree
    if args.tree {
        println!("{:#?}", parsed.node);
        return;
    }

    if args.list_blocks {
        fn print_blocks(node: &Node, indent: usize) {
            for child in node.children() {
                let Child::Node(child) = child else {
                    continue;
                };
                if child.is_anonymous() {
                    print_blocks(child, indent);
                    continue;
                }
                let origin = child
                    .options
                    .get(views::supervisor::VIEW_OPTION)
                    .map(|v| format!("({})", v))
                    .unwrap_or_default();
                println!("{}{} {}", "  ".repeat(indent), child.name(), origin);
                print_blocks(child, indent + 1);
            }
        }
        print_blocks(&parsed.node, 0);
        return;
    }

    let mut pass = templater::RenderPass::new(views.config.max_depth);
    match parsed.node.compile_with(&mut pass) {
        Ok(output) => {
            if !args.quiet {
                print!("{}", output);
            }
        }
        Err(error) => {
            emit_error(&writer, &config, views.files(), &error);
            process::exit(1);
        }
    }
}

fn emit(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostic: &Diagnostic<usize>,
) {
    let _ = term::emit_to_write_style(&mut writer.lock(), config, files, diagnostic);
}

fn emit_error(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    error: &TemplateError,
) {
    match error {
        TemplateError::Syntax(diagnostics) => emit_diagnostics(writer, config, files, diagnostics),
        other => emit(writer, config, files, &Diagnostic::new(Severity::Error).with_message(other.to_string())),
    }
}

fn emit_diagnostics(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostics: &[TemplateDiagnostic],
) {
    for diagnostic in diagnostics {
        emit(writer, config, files, &diagnostic.to_diagnostic());
    }
}
