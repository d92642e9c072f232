use rustyline::{Config, Editor, Result};

pub const DEFAULT_PROMPT: &str = "> ";

pub fn generate_prompt(custom_prompt: Option<&str>) -> String {
    custom_prompt.unwrap_or(DEFAULT_PROMPT).to_string()
}

/// Line editor with in-memory history only; nothing is written to disk.
pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder().history_ignore_space(true).build();
    Editor::with_config(config)
}
