use anyhow::{anyhow, bail, Result};

use crate::exec::Redirect;

pub const MAXARGS: usize = 128;

/// Parses one command line into an argument vector, a single optional
/// redirection, and a background flag (`&`).
///
/// Pipelines and append redirection are rejected; the launcher supports
/// exactly one redirected standard stream.
pub fn parse_command_line(cmdline: &str) -> Result<(Vec<String>, Redirect, bool)> {
    let tokens = tokenize(cmdline);
    if tokens.is_empty() {
        bail!("empty command line");
    }

    let mut argv = Vec::new();
    let mut redirect = Redirect::None;
    let mut bg = false;
    let mut iter = tokens.into_iter();

    while let Some(token) = iter.next() {
        match token.as_str() {
            "<" | ">" => {
                if redirect != Redirect::None {
                    bail!("only one redirection is supported");
                }
                let file = iter
                    .next()
                    .ok_or_else(|| anyhow!("no file given for '{token}'"))?;
                redirect = if token == "<" {
                    Redirect::Stdin(file)
                } else {
                    Redirect::Stdout(file)
                };
            }
            ">>" => bail!("append redirection is not supported"),
            "|" => bail!("pipelines are not supported"),
            "&" => bg = true,
            _ => {
                if argv.len() >= MAXARGS - 1 {
                    bail!("too many arguments");
                }
                argv.push(token);
            }
        }
    }

    if argv.is_empty() {
        bail!("missing command name");
    }
    Ok((argv, redirect, bg))
}

/// Splits the input line into tokens, honoring single/double quotes and
/// the special tokens `<`, `>`, `>>`, `|`, and `&`.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '"' || ch == '\'' {
            let quote = ch;
            chars.next();
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                chars.next();
                if c == quote {
                    break;
                }
                token.push(c);
            }
            tokens.push(token);
        } else if ch == '>' {
            chars.next();
            if chars.peek() == Some(&'>') {
                chars.next();
                tokens.push(">>".to_string());
            } else {
                tokens.push(">".to_string());
            }
        } else if ch == '<' || ch == '|' || ch == '&' {
            chars.next();
            tokens.push(ch.to_string());
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || matches!(c, '<' | '>' | '|' | '&') {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_simple() {
        assert_eq!(tokenize("ls -l"), vec!["ls", "-l"]);
    }

    #[test]
    fn tokenize_quotes() {
        assert_eq!(tokenize("echo \"hello world\""), vec!["echo", "hello world"]);
    }

    #[test]
    fn parse_background_with_output_redirection() {
        let (argv, redirect, bg) = parse_command_line("sort names.txt > out.txt &").unwrap();
        assert_eq!(argv, vec!["sort", "names.txt"]);
        assert_eq!(redirect, Redirect::Stdout("out.txt".to_string()));
        assert!(bg);
    }

    #[test]
    fn parse_input_redirection() {
        let (argv, redirect, bg) = parse_command_line("wc -l < input.txt").unwrap();
        assert_eq!(argv, vec!["wc", "-l"]);
        assert_eq!(redirect, Redirect::Stdin("input.txt".to_string()));
        assert!(!bg);
    }

    #[test]
    fn rejects_pipelines_and_double_redirection() {
        assert!(parse_command_line("ls | wc").is_err());
        assert!(parse_command_line("cat < a > b").is_err());
        assert!(parse_command_line("cat >> log").is_err());
        assert!(parse_command_line("> out").is_err());
        assert!(parse_command_line("   ").is_err());
    }
}
