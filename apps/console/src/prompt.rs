//! Terminal stand-in for the "new instance" dialog.

use std::collections::BTreeMap;

use async_trait::async_trait;
use client_core::ParameterPrompt;
use shared::protocol::Template;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Parses a `name=value` command line pair.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

pub struct TerminalPrompt {
    presets: BTreeMap<String, String>,
    interactive: bool,
}

impl TerminalPrompt {
    pub fn new(presets: BTreeMap<String, String>, interactive: bool) -> Self {
        Self {
            presets,
            interactive,
        }
    }

    /// Asks for every template parameter without a preset value.
    ///
    /// Blank answers leave the parameter out; end of input dismisses the
    /// prompt.
    async fn collect_from<R, W>(
        &self,
        template: &Template,
        input: R,
        mut output: W,
    ) -> anyhow::Result<Option<BTreeMap<String, String>>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut values = self.presets.clone();
        let missing: Vec<String> = template
            .parameters
            .iter()
            .filter(|name| !values.contains_key(*name))
            .cloned()
            .collect();
        if missing.is_empty() || !self.interactive {
            return Ok(Some(values));
        }

        output
            .write_all(format!("New {} instance (Ctrl-D cancels)\n", template.id).as_bytes())
            .await?;
        let mut lines = input.lines();
        for name in missing {
            output.write_all(format!("{name}: ").as_bytes()).await?;
            output.flush().await?;
            let Some(line) = lines.next_line().await? else {
                return Ok(None);
            };
            let value = line.trim();
            if !value.is_empty() {
                values.insert(name, value.to_string());
            }
        }
        Ok(Some(values))
    }
}

#[async_trait]
impl ParameterPrompt for TerminalPrompt {
    async fn collect(
        &self,
        template: &Template,
    ) -> anyhow::Result<Option<BTreeMap<String, String>>> {
        self.collect_from(
            template,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use shared::domain::TemplateId;

    use super::*;

    fn notebook_template() -> Template {
        Template {
            id: TemplateId::new("jupyter"),
            description: String::new(),
            parameters: vec!["id".to_string(), "memory".to_string(), "cpus".to_string()],
            extra: Map::new(),
        }
    }

    #[test]
    fn parses_name_value_pairs() {
        assert_eq!(
            parse_param("memory=2g").expect("param"),
            ("memory".to_string(), "2g".to_string())
        );
        assert_eq!(
            parse_param("query=a=b").expect("param"),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_param("memory").is_err());
        assert!(parse_param("=2g").is_err());
    }

    #[tokio::test]
    async fn asks_only_for_parameters_without_presets() {
        let prompt = TerminalPrompt::new(BTreeMap::from([("id".to_string(), "nb".to_string())]), true);
        let mut output = Vec::new();

        let values = prompt
            .collect_from(&notebook_template(), &b"4g\n\n"[..], &mut output)
            .await
            .expect("collect")
            .expect("confirmed");

        assert_eq!(values.get("id").map(String::as_str), Some("nb"));
        assert_eq!(values.get("memory").map(String::as_str), Some("4g"));
        assert!(!values.contains_key("cpus"));
        let transcript = String::from_utf8(output).expect("utf8");
        assert!(transcript.contains("memory: "));
        assert!(!transcript.contains("id: "));
    }

    #[tokio::test]
    async fn end_of_input_dismisses() {
        let prompt = TerminalPrompt::new(BTreeMap::new(), true);

        let values = prompt
            .collect_from(&notebook_template(), &b"nb\n"[..], Vec::new())
            .await
            .expect("collect");

        assert!(values.is_none());
    }

    #[tokio::test]
    async fn non_interactive_uses_presets_only() {
        let prompt = TerminalPrompt::new(BTreeMap::from([("id".to_string(), "nb".to_string())]), false);

        let values = prompt
            .collect_from(&notebook_template(), &b""[..], Vec::new())
            .await
            .expect("collect")
            .expect("confirmed");

        assert_eq!(values.len(), 1);
    }
}
