use std::path::{Path, PathBuf};

use adtunify::{
    evaluator,
    prelude::{Error, Span},
    reader,
    session::{script_lines, Limits, Response, Session, SessionError},
    unify,
};
use anyhow::{Context as _, Result};
use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use util::repl;

#[derive(Parser, Debug)]
#[command(name = "adtunify", version, about = "Unification of algebraic data types")]
struct Args {
    /// Scripts evaluated in order before the REPL starts
    files: Vec<PathBuf>,
    #[arg(long, default_value = "/tmp/adtunify.history")]
    history: String,
    /// Nesting limit for parenthesized input
    #[arg(long, default_value_t = reader::DEFAULT_DEPTH)]
    read_depth: usize,
    /// Evaluation depth limit
    #[arg(long, default_value_t = evaluator::DEFAULT_DEPTH)]
    eval_depth: usize,
    /// Unification depth limit
    #[arg(long, default_value_t = unify::DEFAULT_DEPTH)]
    unify_depth: usize,
    /// Exit after the scripts instead of starting the REPL
    #[arg(long)]
    no_repl: bool,
}

/// What the parser saw at the error, or the end of the input.
fn found(e: &Error) -> &str {
    e.found().map(String::as_str).unwrap_or("end of the input")
}

fn build_report(e: Error) -> Report<Span> {
    use chumsky::error::SimpleReason;
    let (message, labels) = match e.reason() {
        SimpleReason::Unexpected => {
            let mut expected = e
                .expected()
                .map(|t| t.as_deref().unwrap_or("end of the input"))
                .collect::<Vec<_>>();
            expected.sort_unstable();
            let expected = match expected.as_slice() {
                [] => "something else".to_string(),
                [one] => one.to_string(),
                many => format!("one of {}", many.join(", ")),
            };
            (
                format!("Unexpected {}, expected {expected}", found(&e)),
                vec![(e.span(), format!("Unexpected {}", found(&e).fg(Color::Red)), Color::Red)],
            )
        }
        SimpleReason::Unclosed { span, delimiter } => (
            format!("Unclosed {}", delimiter.fg(Color::Yellow)),
            vec![
                (span.clone(), "opened here".to_string(), Color::Yellow),
                (
                    e.span(),
                    format!("list ends before this {}", found(&e).fg(Color::Red)),
                    Color::Red,
                ),
            ],
        ),
        SimpleReason::Custom(msg) => (
            msg.clone(),
            vec![(e.span(), format!("{}", msg.fg(Color::Red)), Color::Red)],
        ),
    };
    labels
        .into_iter()
        .fold(
            Report::build(ReportKind::Error, (), e.span().start).with_message(message),
            |report, (span, text, color)| {
                report.with_label(Label::new(span).with_message(text).with_color(color))
            },
        )
        .finish()
}

fn print_response(response: &Response) {
    let text = response.to_string();
    match response {
        Response::Unified { .. } => println!("{}", text.fg(Color::Green)),
        Response::Mismatch { .. } => println!("{}", text.fg(Color::Red)),
        Response::Value(_) | Response::Macro { .. } => println!("{}", text.fg(Color::Yellow)),
        _ => println!("{text}"),
    }
}

/// Prints recoverable errors. Invariant violations are passed on to abort the caller.
fn report(e: SessionError) -> Result<()> {
    match e {
        SessionError::Parse { input, errors } => {
            for e in errors {
                build_report(e).eprint(Source::from(&input))?;
            }
            Ok(())
        }
        SessionError::Violation(violation) => Err(violation.into()),
        e => {
            eprintln!("{}", e.to_string().fg(Color::Red));
            Ok(())
        }
    }
}

fn run_script(session: &mut Session, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    info!(path = %path.display(), "running script");
    for (line_number, line) in script_lines(&text) {
        match session.evaluate(None, line) {
            Ok(response) => print_response(&response),
            Err(e) => report(e).with_context(|| format!("{}:{line_number}", path.display()))?,
        }
    }
    Ok(())
}

struct Repl {
    session: Session,
    history: String,
}
impl repl::Repl for Repl {
    type Error = anyhow::Error;
    fn history(&self) -> Option<&str> {
        Some(&self.history)
    }
    fn prompt(&self) -> String {
        format!("{}> ", self.session.next_input_name())
    }
    fn evaluate(&mut self, input: String) -> Result<(), Self::Error> {
        if input.trim().is_empty() {
            return Ok(());
        }
        match self.session.handle(&input) {
            Ok(response) => print_response(&response),
            Err(SessionError::UnknownCommand(cmd)) => {
                eprintln!("Unknown command {cmd}");
                println!("{}", Response::Help);
            }
            Err(e) => report(e)?,
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut session = Session::new(Limits {
        read_depth: args.read_depth,
        eval_depth: args.eval_depth,
        unify_depth: args.unify_depth,
    });
    for path in &args.files {
        run_script(&mut session, path)?;
    }
    if args.no_repl {
        return Ok(());
    }

    println!("Hi, this is an ADT unification REPL. :h to show help");
    println!();
    repl::start_repl(Repl {
        session,
        history: args.history,
    })?;
    Ok(())
}
