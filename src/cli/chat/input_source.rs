use rustyline::error::ReadlineError;

use super::prompt;

/// Where user lines come from: the terminal, or a fixed script in tests.
pub struct InputSource(inner::Inner);

mod inner {
    use rustyline::Editor;

    pub enum Inner {
        Readline(Editor<()>),
        #[cfg(test)]
        Mock { index: usize, lines: Vec<String> },
    }
}

impl InputSource {
    pub fn new() -> rustyline::Result<Self> {
        Ok(Self(inner::Inner::Readline(prompt::rl()?)))
    }

    #[cfg(test)]
    pub fn new_mock(lines: Vec<String>) -> Self {
        Self(inner::Inner::Mock { index: 0, lines })
    }

    /// Reads one line without its trailing newline.
    ///
    /// `Ok(None)` means the user is done: end of input or Ctrl-C.
    pub fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ReadlineError> {
        match &mut self.0 {
            inner::Inner::Readline(rl) => match rl.readline(prompt) {
                Ok(line) => {
                    rl.add_history_entry(line.as_str());
                    Ok(Some(line))
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
                Err(e) => Err(e),
            },
            #[cfg(test)]
            inner::Inner::Mock { index, lines } => {
                let _ = prompt;
                *index += 1;
                Ok(lines.get(*index - 1).cloned())
            }
        }
    }
}
