//! Turns one line of shell input into a [`Command`].
//!
//! Most commands are whitespace-separated tokens; `wfile` is the exception,
//! matching the original's `sscanf(..., "wfile %s %s %[^\n]", ...)`: its
//! third argument is everything remaining on the line, spaces included.

use fsim_types::Permissions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Cd(String),
    Ls,
    Pwd,
    Mkdir(String),
    Touch(String),
    Rm(String),
    Remdir(String),
    Cp { src: String, new_name: String, dest_path: String },
    Mv { src: String, dest_path: String },
    Ln { target: String, link: String, dest_path: String },
    Sym { target_path: String, link_name: String },
    Rfile(String),
    Wfile { name: String, mode: WriteMode, text: String },
    Stat(String),
    Chmod { name: String, perms: Permissions },
    Help,
    Exit,
    Empty,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Add,
    Rewrite,
}

/// Parses one line of input. Never fails: anything that doesn't match a
/// known shape becomes [`Command::Unknown`], which the caller reports
/// without ending the shell.
#[must_use]
pub fn parse(line: &str) -> Command {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Command::Empty;
    };

    match head {
        "exit" => Command::Exit,
        "help" => Command::Help,
        "ls" => Command::Ls,
        "pwd" => Command::Pwd,
        "cd" => one_arg(words, line, Command::Cd),
        "mkdir" => one_arg(words, line, Command::Mkdir),
        "touch" => one_arg(words, line, Command::Touch),
        "rm" => one_arg(words, line, Command::Rm),
        "remdir" => one_arg(words, line, Command::Remdir),
        "rfile" => one_arg(words, line, Command::Rfile),
        "stat" => one_arg(words, line, Command::Stat),
        "cp" => match (words.next(), words.next(), words.next(), words.next()) {
            (Some(src), Some(new_name), Some(dest_path), None) => Command::Cp {
                src: src.to_string(),
                new_name: new_name.to_string(),
                dest_path: dest_path.to_string(),
            },
            _ => Command::Unknown(line.to_string()),
        },
        "mv" => match (words.next(), words.next(), words.next()) {
            (Some(src), Some(dest_path), None) => Command::Mv {
                src: src.to_string(),
                dest_path: dest_path.to_string(),
            },
            _ => Command::Unknown(line.to_string()),
        },
        "ln" => match (words.next(), words.next(), words.next(), words.next()) {
            (Some(target), Some(link), Some(dest_path), None) => Command::Ln {
                target: target.to_string(),
                link: link.to_string(),
                dest_path: dest_path.to_string(),
            },
            _ => Command::Unknown(line.to_string()),
        },
        "sym" => match (words.next(), words.next(), words.next()) {
            (Some(target_path), Some(link_name), None) => Command::Sym {
                target_path: target_path.to_string(),
                link_name: link_name.to_string(),
            },
            _ => Command::Unknown(line.to_string()),
        },
        "chmod" => match (words.next(), words.next(), words.next()) {
            (Some(name), Some(perms), None) => match perms.parse() {
                Ok(perms) => Command::Chmod { name: name.to_string(), perms },
                Err(_) => Command::Unknown(line.to_string()),
            },
            _ => Command::Unknown(line.to_string()),
        },
        "wfile" => parse_wfile(line),
        _ => Command::Unknown(line.to_string()),
    }
}

fn one_arg<'a>(
    mut words: impl Iterator<Item = &'a str>,
    line: &str,
    make: impl FnOnce(String) -> Command,
) -> Command {
    match (words.next(), words.next()) {
        (Some(arg), None) => make(arg.to_string()),
        _ => Command::Unknown(line.to_string()),
    }
}

fn parse_wfile(line: &str) -> Command {
    let rest = line["wfile".len()..].trim_start();
    let Some(sp1) = rest.find(char::is_whitespace) else {
        return Command::Unknown(line.to_string());
    };
    let name = &rest[..sp1];
    let rest = rest[sp1..].trim_start();
    let Some(sp2) = rest.find(char::is_whitespace) else {
        return Command::Unknown(line.to_string());
    };
    let mode_str = &rest[..sp2];
    // Consume exactly one separator after the mode and keep the remainder
    // verbatim, matching `sscanf`'s "%[^\n]": extra whitespace in the text
    // argument is part of the text, not a delimiter to collapse.
    let mut after_mode = rest[sp2..].chars();
    after_mode.next();
    let tail = after_mode.as_str();
    if name.is_empty() || tail.is_empty() {
        return Command::Unknown(line.to_string());
    }
    let mode = match mode_str {
        "add" => WriteMode::Add,
        "rewrite" => WriteMode::Rewrite,
        _ => return Command::Unknown(line.to_string()),
    };
    Command::Wfile {
        name: name.to_string(),
        mode,
        text: tail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wfile_captures_free_text_tail() {
        let cmd = parse("wfile a rewrite hello world");
        assert_eq!(
            cmd,
            Command::Wfile {
                name: "a".to_string(),
                mode: WriteMode::Rewrite,
                text: "hello world".to_string(),
            }
        );
    }

    #[test]
    fn cp_requires_exactly_three_args() {
        assert_eq!(
            parse("cp a b d"),
            Command::Cp {
                src: "a".to_string(),
                new_name: "b".to_string(),
                dest_path: "d".to_string(),
            }
        );
        assert!(matches!(parse("cp a b"), Command::Unknown(_)));
    }

    #[test]
    fn blank_line_is_empty() {
        assert_eq!(parse(""), Command::Empty);
        assert_eq!(parse("   "), Command::Empty);
    }

    #[test]
    fn unrecognized_verb_is_unknown() {
        assert!(matches!(parse("frobnicate x"), Command::Unknown(_)));
    }
}
