//! The interactive shell: prompt, read, parse, dispatch, save.
//!
//! Mirrors `original_source/filesystem.c`'s `interactive_shell` loop, but
//! each command persists the whole control region as soon as it returns,
//! rather than leaving that to an explicit `save` verb.

pub mod command;
pub mod parser;

use std::io::{self, BufRead, Write};

use crate::fs::FileSystem;
use crate::path;
use parser::Command;

/// Runs the REPL against `fs` until `exit` is entered or stdin closes.
pub fn run(fs: &mut FileSystem) {
    let stdin = io::stdin();
    let mut cwd = fs.current_dir();

    loop {
        print!("{}> ", path::full_path(cwd, fs.inodes(), fs.directories()));
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::error!("failed to read command: {e}");
                break;
            }
        }

        match parser::parse(&line) {
            Command::Exit => {
                log::info!("exit");
                break;
            }
            cmd => {
                log::info!("command: {line}", line = line.trim_end());
                command::execute(fs, &mut cwd, cmd);
            }
        }

        fs.set_current_dir(cwd);
        if let Err(e) = fs.save() {
            log::error!("failed to save image: {e}");
            println!("error: failed to save image: {e}");
        }
    }
}
