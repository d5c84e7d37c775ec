use rustyline::{error::ReadlineError, Editor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error<E> {
    #[error(transparent)]
    Readline(ReadlineError),
    #[error("Eval failed: {0:?}")]
    EvalError(E),
}

pub trait Repl {
    type Error: std::fmt::Debug;
    fn history(&self) -> Option<&str> {
        None
    }
    fn prompt(&self) -> String {
        ">> ".to_string()
    }
    fn evaluate(&mut self, input: String) -> Result<(), Self::Error>;
}

/// Reads lines until EOF or Ctrl-C. A line ending in `\` continues on the next one.
pub fn start_repl<R: Repl>(mut repl: R) -> Result<(), Error<R::Error>> {
    let mut editor = Editor::<()>::new();
    if let Some(history) = repl.history() {
        editor.load_history(history).ok();
    }
    let mut input: Option<String> = None;
    loop {
        let prompt = if input.is_some() {
            ".. ".to_string()
        } else {
            repl.prompt()
        };
        match editor.readline(&prompt) {
            Ok(mut line) if line.ends_with('\\') => {
                line.pop();
                line.push('\n');
                if let Some(input) = input.as_mut() {
                    input.push_str(line.as_str());
                } else {
                    input = Some(line);
                }
            }
            Ok(line) => {
                let input = if let Some(mut input) = input.take() {
                    input.push_str(line.as_str());
                    input
                } else {
                    line
                };
                editor.add_history_entry(input.as_str());
                repl.evaluate(input).map_err(Error::EvalError)?;
                if let Some(history) = repl.history() {
                    editor.save_history(history).map_err(Error::Readline)?;
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                println!("Bye!");
                break Ok(());
            }
            Err(e) => break Err(Error::Readline(e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Echo;
    impl Repl for Echo {
        type Error = ();
        fn evaluate(&mut self, _input: String) -> Result<(), ()> {
            Ok(())
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Echo.history(), None);
        assert_eq!(Echo.prompt(), ">> ");
    }
}
