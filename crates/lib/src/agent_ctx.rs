//! System prompt for new conversations: the workspace's AGENTS.md when present, otherwise the
//! configured prompt, otherwise the built-in default.

use std::fs;
use std::path::Path;

use crate::orchestrator::DEFAULT_SYSTEM_PROMPT;

/// Load agent context from the workspace (AGENTS.md). None when missing or blank.
pub fn load_agent_ctx(workspace_dir: &Path) -> Option<String> {
    let path = workspace_dir.join("AGENTS.md");
    match fs::read_to_string(&path) {
        Ok(s) if !s.trim().is_empty() => {
            log::debug!("agent_ctx: loaded {}", path.display());
            Some(s)
        }
        _ => None,
    }
}

pub fn load_system_prompt(workspace_dir: &Path, configured: Option<&str>) -> String {
    load_agent_ctx(workspace_dir)
        .or_else(|| {
            configured
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_agents_md_then_config_then_default() {
        let dir = std::env::temp_dir().join(format!("parley-ctx-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();

        assert_eq!(load_system_prompt(&dir, None), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(load_system_prompt(&dir, Some("  Be terse. ")), "Be terse.");

        fs::write(dir.join("AGENTS.md"), "  \n").unwrap();
        assert_eq!(load_system_prompt(&dir, Some("Be terse.")), "Be terse.");

        fs::write(dir.join("AGENTS.md"), "# Rules\nAlways cite files.").unwrap();
        assert_eq!(load_system_prompt(&dir, Some("Be terse.")), "# Rules\nAlways cite files.");
        let _ = fs::remove_dir_all(&dir);
    }
}
