use std::time::SystemTime;

use colored::Colorize;

/// All interactions with the text UI should go through this struct.
pub struct Ui {
    /// -v setting, displays extra text info to user
    pub verbose: bool,
    /// keeps track of time for each pipeline phase
    start_time: SystemTime,
}

impl Ui {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            start_time: SystemTime::now(),
        }
    }

    /// A banner line in the original scripts' style:
    /// the text followed by a full-width rule.
    pub fn header(&self, text: &str, rule: char) {
        eprintln!("{}", text.bold());
        eprintln!("{}", rule.to_string().repeat(text.len()));
    }

    pub fn start_timer(&mut self) {
        self.start_time = SystemTime::now();
    }

    pub fn print_elapsed(&self, what: &str) {
        if let Ok(elapsed) = self.start_time.elapsed() {
            eprintln!("{what} took {elapsed:?}");
        }
    }

    pub fn verbose_msg(&self, msg: &str) {
        if self.verbose {
            eprintln!("{}", msg);
        }
    }

    pub fn verbose_progress(&self, msg: &str) {
        if self.verbose {
            eprint!("{}... ", msg.magenta());
        }
    }

    pub fn done(&self) {
        if self.verbose {
            eprintln!("{}.", "done".green());
        }
    }
}
