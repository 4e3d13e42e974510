use crate::domain::model::Stage;
use crate::domain::ports::Storage;
use crate::utils::error::{BoostError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Prompt text with `{name}` placeholders. `{{` and `}}` render as literal braces.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.walk(|segment| {
            if let Segment::Placeholder(name) = segment {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        });
        names
    }

    pub fn contains_placeholder(&self, name: &str) -> bool {
        self.placeholders().iter().any(|n| n == name)
    }

    pub fn format(&self, args: &HashMap<String, String>) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut missing = None;

        self.walk(|segment| match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Placeholder(name) => match args.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    if missing.is_none() {
                        missing = Some(name.to_string());
                    }
                }
            },
        });

        match missing {
            Some(name) => Err(BoostError::internal(format!(
                "prompt placeholder '{{{}}}' has no value",
                name
            ))),
            None => Ok(out),
        }
    }

    fn walk<'a>(&'a self, mut visit: impl FnMut(Segment<'a>)) {
        let text = self.text.as_str();
        let bytes = text.as_bytes();
        let mut literal_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'{' if bytes.get(i + 1) == Some(&b'{') => {
                    visit(Segment::Literal(&text[literal_start..i + 1]));
                    i += 2;
                    literal_start = i;
                }
                b'}' if bytes.get(i + 1) == Some(&b'}') => {
                    visit(Segment::Literal(&text[literal_start..i + 1]));
                    i += 2;
                    literal_start = i;
                }
                b'{' => {
                    let rest = &text[i + 1..];
                    let name_len = rest
                        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                        .unwrap_or(rest.len());
                    // 不是合法的 {identifier} 就當作一般文字
                    if name_len > 0 && rest.as_bytes().get(name_len) == Some(&b'}') {
                        visit(Segment::Literal(&text[literal_start..i]));
                        visit(Segment::Placeholder(&rest[..name_len]));
                        i += name_len + 2;
                        literal_start = i;
                    } else {
                        i += 1;
                    }
                }
                _ => i += 1,
            }
        }

        if literal_start < text.len() {
            visit(Segment::Literal(&text[literal_start..]));
        }
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Resolves prompt files through the stage search path and caches them for the
/// lifetime of the process.
pub struct PromptStore {
    stage: Stage,
    local: Arc<dyn Storage>,
    remote: Option<Arc<dyn Storage>>,
    cache: RwLock<HashMap<String, Arc<PromptTemplate>>>,
}

impl PromptStore {
    pub fn new(stage: Stage, local: Arc<dyn Storage>) -> Self {
        Self {
            stage,
            local,
            remote: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn Storage>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn get(&self, filename: &str) -> Result<Arc<PromptTemplate>> {
        if let Some(template) = self.cache.read().await.get(filename) {
            return Ok(template.clone());
        }

        let bytes = self.fetch(filename).await?;
        let text = String::from_utf8(bytes).map_err(|e| {
            BoostError::internal(format!("prompt file {} is not UTF-8: {}", filename, e))
        })?;
        let template = Arc::new(PromptTemplate::new(text));

        self.cache
            .write()
            .await
            .insert(filename.to_string(), template.clone());
        Ok(template)
    }

    async fn fetch(&self, filename: &str) -> Result<Vec<u8>> {
        for stage in self.stage.search_path() {
            let attempt = match (stage, &self.remote) {
                (Stage::Local, _) => self.local.read_file(filename).await,
                (_, Some(remote)) => {
                    let key = format!("{}/{}", stage, filename);
                    remote.read_file(&key).await
                }
                (_, None) => continue,
            };

            match attempt {
                Ok(bytes) => {
                    tracing::debug!("Loaded prompt {} from stage {}", filename, stage);
                    return Ok(bytes);
                }
                Err(BoostError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(BoostError::NotFound {
            message: format!(
                "File {} not found in any of the specified stages or locally.",
                filename
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MemoryStorage {
        files: HashMap<String, String>,
        reads: AtomicUsize,
    }

    impl MemoryStorage {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(path)
                .map(|s| s.clone().into_bytes())
                .ok_or_else(|| BoostError::NotFound {
                    message: path.to_string(),
                })
        }
    }

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_format_replaces_placeholders() {
        let template = PromptTemplate::new("Explain this {language} code:\n\n{code}\n");
        let rendered = template
            .format(&args(&[("language", "rust"), ("code", "fn main() {}")]))
            .unwrap();
        assert_eq!(rendered, "Explain this rust code:\n\nfn main() {}\n");
    }

    #[test]
    fn test_format_escapes_and_non_identifiers() {
        let template = PromptTemplate::new("json {{\"a\": 1}} { not a placeholder } {x}");
        let rendered = template.format(&args(&[("x", "{y}")])).unwrap();
        assert_eq!(rendered, "json {\"a\": 1} { not a placeholder } {y}");
    }

    #[test]
    fn test_format_missing_argument_fails() {
        let template = PromptTemplate::new("{code} in {language}");
        let err = template.format(&args(&[("code", "x")])).unwrap_err();
        assert!(err.to_string().contains("language"));
    }

    #[test]
    fn test_placeholders() {
        let template = PromptTemplate::new("{code} {{skip}} {code} {prompt}");
        assert_eq!(template.placeholders(), vec!["code", "prompt"]);
        assert!(template.contains_placeholder("prompt"));
    }

    #[tokio::test]
    async fn test_store_prefers_earliest_stage_and_caches() {
        let local = Arc::new(MemoryStorage::new(&[("explain.prompt", "local")]));
        let remote = Arc::new(MemoryStorage::new(&[
            ("prod/explain.prompt", "prod"),
            ("staging/other.prompt", "staging"),
        ]));

        let store = PromptStore::new(Stage::Staging, local.clone()).with_remote(remote.clone());

        let template = store.get("explain.prompt").await.unwrap();
        assert_eq!(template.text(), "prod");

        let again = store.get("explain.prompt").await.unwrap();
        assert_eq!(again.text(), "prod");
        // staging miss + prod hit, then served from cache
        assert_eq!(remote.reads.load(Ordering::SeqCst), 2);
        assert_eq!(local.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_falls_back_to_local() {
        let local = Arc::new(MemoryStorage::new(&[("explain.prompt", "local")]));
        let store = PromptStore::new(Stage::Dev, local);
        assert_eq!(store.get("explain.prompt").await.unwrap().text(), "local");
        assert!(matches!(
            store.get("missing.prompt").await,
            Err(BoostError::NotFound { .. })
        ));
    }
}
