//! Markup injected into HTML responses.

use crate::config::CsrfConfig;
use bytes::Bytes;

/// Pre-rendered fragments, built once per engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragments {
    /// Inserted right after the `<body ...>` opening tag.
    pub noscript: Bytes,
    /// Inserted right before `</body>`.
    pub script: Bytes,
}

impl Fragments {
    pub fn render(config: &CsrfConfig) -> Self {
        let noscript = format!("\n<noscript>\n{}\n</noscript>", config.disabled_js_message);

        let rules = config
            .verify_get_for
            .iter()
            .map(|rule| format!("'{}'", js_escape(rule.source())))
            .collect::<Vec<_>>()
            .join(",");

        let script = format!(
            "\n<script type=\"text/javascript\" src=\"{js}\"></script>\n\
             <script type=\"text/JavaScript\">\n\
             window.onload = function() {{\n\
             \t  CSRFP.checkForUrls = [{rules}];\n\
             \t  CSRFP.CSRFP_TOKEN = '{name}';\n\
             \t  csrfprotector_init();\n\
             }}\n\
             </script>\n",
            js = html_attr_escape(&config.js_file_path),
            name = js_escape(&config.token_name),
        );

        Self {
            noscript: Bytes::from(noscript),
            script: Bytes::from(script),
        }
    }

    /// Arbitrary fragments, mostly for tests and benchmarks.
    pub fn custom(noscript: impl Into<Bytes>, script: impl Into<Bytes>) -> Self {
        Self {
            noscript: noscript.into(),
            script: script.into(),
        }
    }

    /// Bytes added to a response that receives both fragments.
    pub fn total_len(&self) -> usize {
        self.noscript.len() + self.script.len()
    }
}

/// Escape for a single-quoted JS string inside an HTML `<script>` block.
fn js_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\x3C"),
            '>' => out.push_str("\\x3E"),
            c => out.push(c),
        }
    }
    out
}

fn html_attr_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render() {
        let config = CsrfConfig::builder()
            .with_disabled_js_message("Enable JS")
            .build()
            .unwrap();
        let fragments = Fragments::render(&config);
        assert_eq!(&fragments.noscript[..], b"\n<noscript>\nEnable JS\n</noscript>");

        let script = std::str::from_utf8(&fragments.script).unwrap();
        assert!(script.starts_with(
            "\n<script type=\"text/javascript\" src=\"http://localhost/csrfp_js/csrfprotector.js\"></script>\n"
        ));
        assert!(script.contains("CSRFP.checkForUrls = [];"));
        assert!(script.contains("CSRFP.CSRFP_TOKEN = 'csrfp_token';"));
        assert!(script.ends_with("csrfprotector_init();\n}\n</script>\n"));
    }

    #[test]
    fn test_rules_are_escaped() {
        let config = CsrfConfig::builder()
            .verify_get(r"^https://a\.example/x")
            .verify_get("it's")
            .build()
            .unwrap();
        let fragments = Fragments::render(&config);
        let script = std::str::from_utf8(&fragments.script).unwrap();
        assert!(script.contains(r"CSRFP.checkForUrls = ['^https://a\\.example/x','it\'s'];"));
    }

    #[test]
    fn test_script_breakout_is_escaped() {
        assert_eq!(js_escape("</script>"), "\\x3C/script\\x3E");
        assert_eq!(html_attr_escape("/a\"b"), "/a&quot;b");
    }

    #[test]
    fn test_total_len() {
        let fragments = Fragments::custom("<n/>", "<s/>");
        assert_eq!(fragments.total_len(), 8);
    }
}
