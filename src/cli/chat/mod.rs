pub mod conversation_state;
pub mod input_source;
pub mod persona;
pub mod prompt;

use std::io::Write;
use std::process::ExitCode;

use color_print::cformat;
use conversation_state::ConversationState;
use eyre::Result;
use input_source::InputSource;
use prompt::generate_prompt;
use tracing::debug;

use crate::gemini_client::{fetch_reply, ReplyFetcher};

const REPLY_LABEL: &str = "Sol:";

const FAREWELL_TEXT: [&str; 2] = [
    "Alright, I'm heading out. Take it easy.",
    "(session ended)",
];

/// Words that end the session, compared case-insensitively.
const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

fn is_exit_command(line: &str) -> bool {
    EXIT_COMMANDS
        .iter()
        .any(|command| line.eq_ignore_ascii_case(command))
}

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    conversation_state: ConversationState,
    fetcher: Box<dyn ReplyFetcher>,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        conversation_state: ConversationState,
        fetcher: Box<dyn ReplyFetcher>,
    ) -> Self {
        Self {
            output,
            input,
            conversation_state,
            fetcher,
        }
    }

    /// Sends the one-shot input if there is one, otherwise chats on the terminal.
    pub async fn run(&mut self) -> Result<ExitCode> {
        if let Some(input) = self.input.take() {
            if input.is_empty() {
                writeln!(self.output, "Nothing to send. Pass some text with --input.")?;
                return Ok(ExitCode::SUCCESS);
            }
            self.process_chat_input(&input).await?;
            return Ok(ExitCode::SUCCESS);
        }

        let input_source = InputSource::new()?;
        self.run_interactive(input_source).await?;
        Ok(ExitCode::SUCCESS)
    }

    async fn run_interactive(&mut self, mut input_source: InputSource) -> Result<()> {
        self.print_greeting()?;

        let prompt_text = generate_prompt(None);
        loop {
            let Some(line) = input_source.read_line(&prompt_text)? else {
                debug!("Input closed");
                break;
            };

            if is_exit_command(&line) {
                break;
            }

            if line.is_empty() {
                continue;
            }

            self.process_chat_input(&line).await?;
        }

        drop(input_source);
        self.print_farewell()
    }

    fn print_greeting(&mut self) -> Result<()> {
        let greeting = self.conversation_state.opening_line().to_string();
        self.print_reply(&greeting)
    }

    fn print_farewell(&mut self) -> Result<()> {
        for line in FAREWELL_TEXT {
            writeln!(self.output, "{}", cformat!("<dim>{}</>", line))?;
        }
        self.output.flush()?;
        Ok(())
    }

    fn print_reply(&mut self, text: &str) -> Result<()> {
        writeln!(
            self.output,
            "{} {}",
            cformat!("<cyan><bold>{}</></>", REPLY_LABEL),
            text
        )?;
        self.output.flush()?;
        Ok(())
    }

    async fn process_chat_input(&mut self, input: &str) -> Result<()> {
        self.conversation_state.add_user_message(input)?;

        let reply = fetch_reply(self.fetcher.as_ref(), &mut self.conversation_state).await;
        debug!(history = self.conversation_state.len(), "Turn complete");

        self.print_reply(&reply)
    }
}
