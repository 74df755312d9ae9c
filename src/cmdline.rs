//! Free-form custom argument handling.

use std::path::Path;

use crate::error::Error;

const INPUT_MACRO: &str = "$(INPUT)";
const OUTPUT_MACRO: &str = "$(OUTPUT)";

/// Flags that conflict with the frame count and rate a pipe already carries.
const PIPE_CONFLICTS: &[&str] = &["--fps", "--frames"];

/// Splits user-supplied arguments the way a shell would.
///
/// Whitespace separates tokens unless it appears inside double quotes. The
/// quotes themselves are removed; `""` yields an empty token. `$(INPUT)` and
/// `$(OUTPUT)` expand to the job's source and output paths.
pub fn tokenize(custom: &str, source: &Path, output: &Path) -> Result<Vec<String>, Error> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in custom.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quoted {
        return Err(Error::InvalidCustomArgs {
            reason: format!("unterminated quote in '{custom}'"),
        });
    }
    if in_token {
        tokens.push(current);
    }

    let source = source.display().to_string();
    let output = output.display().to_string();
    Ok(tokens
        .into_iter()
        .map(|t| t.replace(INPUT_MACRO, &source).replace(OUTPUT_MACRO, &output))
        .collect())
}

/// Removes `--fps` and `--frames` from `args`, together with a following
/// value that is not itself a flag. Returns one warning per removed flag.
pub fn strip_pipe_conflicts(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut kept = Vec::with_capacity(args.len());
    let mut warnings = Vec::new();
    let mut iter = args.into_iter().peekable();

    while let Some(arg) = iter.next() {
        let Some(flag) = PIPE_CONFLICTS
            .iter()
            .find(|flag| arg.eq_ignore_ascii_case(flag))
        else {
            kept.push(arg);
            continue;
        };
        warnings.push(format!(
            "WARNING: Custom parameter \"{flag}\" will be ignored in Pipe'd mode!"
        ));
        iter.next_if(|value| !value.starts_with("--"));
    }
    (kept, warnings)
}

/// Renders a command line for the log, quoting arguments with spaces.
pub fn display(program: &Path, args: &[String]) -> String {
    std::iter::once(program.display().to_string())
        .chain(args.iter().cloned())
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(custom: &str) -> Vec<String> {
        tokenize(custom, Path::new("/in/clip.avs"), Path::new("/out/clip.mkv")).unwrap()
    }

    #[test]
    fn test_quotes_group_whitespace() {
        assert_eq!(
            split(r#"--tcfile-in "my file.txt"  --sar 1:1"#),
            vec!["--tcfile-in", "my file.txt", "--sar", "1:1"]
        );
        assert_eq!(split(r#"--title """#), vec!["--title", ""]);
        assert!(split("   ").is_empty());
    }

    #[test]
    fn test_macros_expand() {
        assert_eq!(
            split("--qpfile $(INPUT).qp --dump $(OUTPUT)"),
            vec!["--qpfile", "/in/clip.avs.qp", "--dump", "/out/clip.mkv"]
        );
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        let err = tokenize("--title \"oops", Path::new("a"), Path::new("b")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_strip_removes_flag_and_value() {
        let args = split("--fps 24 --preset slow --FRAMES --ref 4");
        let (kept, warnings) = strip_pipe_conflicts(args);
        assert_eq!(kept, vec!["--preset", "slow", "--ref", "4"]);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("--fps"));
        assert!(warnings[1].contains("--frames"));
    }

    #[test]
    fn test_display_quotes_spaces() {
        let args = vec!["--output".to_string(), "my clip.mkv".to_string()];
        assert_eq!(
            display(Path::new("x264"), &args),
            r#"x264 --output "my clip.mkv""#
        );
    }
}
