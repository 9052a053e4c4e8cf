//! Line-oriented operator prompts.

use rollcall_core::WindowPrompt;
use std::io::{self, BufRead, Write};

pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl LinePrompt<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `question` and read one trimmed line. `None` at end of input.
    pub fn ask(&mut self, question: &str) -> Option<String> {
        let _ = write!(self.output, "{question}");
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    /// Yes/no question; anything but `y`/`yes` is a no.
    pub fn confirm(&mut self, question: &str) -> bool {
        self.ask(&format!("{question} [y/N] "))
            .is_some_and(|answer| matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    pub fn say(&mut self, message: &str) {
        let _ = writeln!(self.output, "{message}");
    }
}

impl<R: BufRead, W: Write> WindowPrompt for LinePrompt<R, W> {
    fn ask_window(&mut self) -> Option<String> {
        self.ask("Session window (e.g. 07:00 AM - 07:15 AM, empty to cancel): ")
            .filter(|answer| !answer.is_empty())
    }

    fn report(&mut self, message: &str) {
        self.say(&format!("error: {message}"));
    }
}
