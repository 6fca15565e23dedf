pub mod config;
pub mod pay;
pub mod smoke;
pub mod summarize;

use std::future::Future;
use std::io::{self, BufRead, Write};

use agentpay_core::config::{AppConfig, LoadOptions, LogFormat};
use agentpay_core::envelope::SUCCESS_PREFIX;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    /// Exit 0 only for a `SUCCESS:` result line.
    pub fn from_result_line(line: String) -> Self {
        let exit_code = if line.starts_with(SUCCESS_PREFIX) { 0 } else { 1 };
        Self { exit_code, output: line }
    }

    pub fn success(output: impl Into<String>) -> Self {
        Self { exit_code: 0, output: output.into() }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self { exit_code: 1, output: format!("Error: {message}") }
    }
}

pub(crate) fn load_config() -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(CommandResult::error)
}

/// Diagnostics go to stderr; stdout carries only the command result.
pub(crate) fn init_logging(config: &AppConfig) {
    let level = config.logging.level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(io::stderr);

    // A subscriber may already be installed when several commands run in one process.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, CommandResult> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| CommandResult::error(format!("failed to start async runtime: {error}")))?;
    Ok(runtime.block_on(future))
}

/// Asks until `accept` takes an answer. `None` means the input ended first.
pub fn prompt_until<R, W, T>(
    reader: &mut R,
    writer: &mut W,
    question: &str,
    retry_hint: &str,
    accept: impl Fn(&str) -> Option<T>,
) -> io::Result<Option<T>>
where
    R: BufRead,
    W: Write,
{
    loop {
        write!(writer, "\n{question} ")?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if let Some(value) = accept(line.trim()) {
            return Ok(Some(value));
        }
        writeln!(writer, "{retry_hint}")?;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{prompt_until, CommandResult};

    fn non_empty(answer: &str) -> Option<String> {
        (!answer.is_empty()).then(|| answer.to_string())
    }

    #[test]
    fn prompt_repeats_until_answer_is_accepted() {
        let mut input = Cursor::new("\n   \npay $5 to acct_1\n");
        let mut output = Vec::new();

        let answer = prompt_until(&mut input, &mut output, "What?", "Cannot be empty.", non_empty)
            .expect("prompt");

        assert_eq!(answer.as_deref(), Some("pay $5 to acct_1"));
        let transcript = String::from_utf8(output).expect("utf8");
        assert_eq!(transcript.matches("Cannot be empty.").count(), 2);
    }

    #[test]
    fn prompt_returns_none_at_end_of_input() {
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let answer = prompt_until(&mut input, &mut output, "What?", "again", non_empty)
            .expect("prompt");

        assert_eq!(answer, None);
    }

    #[test]
    fn result_line_exit_code_follows_success_prefix() {
        assert_eq!(CommandResult::from_result_line("SUCCESS: pi_1".to_string()).exit_code, 0);
        assert_eq!(CommandResult::from_result_line("Error: declined".to_string()).exit_code, 1);
        assert_eq!(CommandResult::error("boom").output, "Error: boom");
    }
}
