//! File sub-agent: `/file read|write|list` commands and "read the file X" requests.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use super::SubAgent;
use crate::tools::ToolBox;

const HELP: &str = "File commands:\n  /file list [dir]\n  /file read <path>\n  /file write <path> <content>";

fn list_request_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:list|show)\b.*?\b(?:files|documents)\b").expect("valid list request pattern")
    })
}

fn read_request_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:read|open|show)\b.*?\b(?:file|document)\b\s+["'`]?([^\s"'`]+)"#)
            .expect("valid read request pattern")
    })
}

#[derive(Debug, PartialEq, Eq)]
enum FileCommand<'a> {
    List(&'a str),
    Read(&'a str),
    Write { path: &'a str, content: &'a str },
    Help,
}

fn parse(raw: &str) -> FileCommand<'_> {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("/file") {
        let rest = rest.trim_start();
        let (verb, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let args = args.trim();
        return match verb {
            "list" | "ls" => FileCommand::List(args),
            "read" | "cat" if !args.is_empty() => FileCommand::Read(args),
            "write" => match args.split_once(char::is_whitespace) {
                Some((path, content)) => FileCommand::Write {
                    path,
                    content: content.trim_start(),
                },
                None => FileCommand::Help,
            },
            _ => FileCommand::Help,
        };
    }
    if list_request_regex().is_match(raw) {
        return FileCommand::List("");
    }
    match read_request_regex().captures(raw).and_then(|c| c.get(1)) {
        Some(m) => FileCommand::Read(m.as_str().trim_end_matches(&['.', ',', '?', '!'][..])),
        None => FileCommand::Help,
    }
}

pub struct FileAgent {
    tools: Arc<ToolBox>,
}

impl FileAgent {
    pub fn new(tools: Arc<ToolBox>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl SubAgent for FileAgent {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn handle_request(&self, raw: &str) -> anyhow::Result<String> {
        match parse(raw) {
            FileCommand::List(dir) => {
                let names = self.tools.list_files(dir).await?;
                if names.is_empty() {
                    Ok("The directory is empty.".to_string())
                } else {
                    Ok(names.join("\n"))
                }
            }
            FileCommand::Read(path) => Ok(self.tools.read_file(path).await?),
            FileCommand::Write { path, content } => {
                Ok(self.tools.write_file(path, content).await?)
            }
            FileCommand::Help => Ok(HELP.to_string()),
        }
    }
}
