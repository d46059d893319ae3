//! 文档检索工具（DocumentSearchAgent 使用）
//!
//! 只依赖检索契约 DocumentRetriever::search(query, filters)；文档入库（OCR、切块、向量化、上传）
//! 在本 crate 之外。InMemoryRetriever 按关键词重叠打分，适合本地运行与测试，后续可接真实向量索引。

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::Tool;

pub const DOCUMENT_SEARCH_TOOL: &str = "document_search";

/// 检索过滤条件
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// 仅在该文件内检索
    pub file_name: Option<String>,
    /// 返回条数上限
    pub top: usize,
}

/// 一条检索结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub source_id: String,
    pub text: String,
}

/// 文档检索契约；结果按相关度降序
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>, String>;

    /// 某个文件的全部内容（按块序）
    async fn get_all_content(&self, file_name: &str) -> Result<Vec<SearchHit>, String>;
}

/// 已入库的一个文本块
#[derive(Clone, Debug)]
struct Chunk {
    file_name: String,
    chunk_num: usize,
    content: String,
    tokens: HashSet<String>,
}

impl Chunk {
    fn source_id(&self) -> String {
        format!("{}#{}", self.file_name, self.chunk_num)
    }

    fn hit(&self) -> SearchHit {
        SearchHit {
            source_id: self.source_id(),
            text: self.content.clone(),
        }
    }
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1)
        .collect()
}

/// 内存检索器：关键词重叠
#[derive(Clone, Default)]
pub struct InMemoryRetriever {
    chunks: Arc<RwLock<Vec<Chunk>>>,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个文件的全部块（chunk_num 从 0 递增）
    pub fn add_document<I, S>(&self, file_name: &str, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = self
            .chunks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (chunk_num, content) in chunks.into_iter().enumerate() {
            let content = content.into();
            store.push(Chunk {
                file_name: file_name.to_string(),
                chunk_num,
                tokens: tokenize_lower(&content),
                content,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentRetriever for InMemoryRetriever {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>, String> {
        let store = self
            .chunks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let in_scope = |c: &&Chunk| {
            filters
                .file_name
                .as_deref()
                .map_or(true, |f| c.file_name == f)
        };

        // "*" 表示不限关键词
        if query.trim() == "*" {
            return Ok(store.iter().filter(in_scope).take(filters.top).map(Chunk::hit).collect());
        }

        let query_tokens = tokenize_lower(query);
        let mut scored: Vec<(usize, &Chunk)> = store
            .iter()
            .filter(in_scope)
            .map(|c| (query_tokens.intersection(&c.tokens).count(), c))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 稳定排序：同分时保留入库顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(filters.top)
            .map(|(_, c)| c.hit())
            .collect())
    }

    async fn get_all_content(&self, file_name: &str) -> Result<Vec<SearchHit>, String> {
        let store = self
            .chunks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut chunks: Vec<&Chunk> = store.iter().filter(|c| c.file_name == file_name).collect();
        if chunks.is_empty() {
            return Err(format!("Document '{file_name}' not found"));
        }
        chunks.sort_by_key(|c| c.chunk_num);
        Ok(chunks.into_iter().map(Chunk::hit).collect())
    }
}

/// 文档检索工具
pub struct DocumentSearchTool {
    retriever: Arc<dyn DocumentRetriever>,
    default_top: usize,
}

impl DocumentSearchTool {
    pub fn new(retriever: Arc<dyn DocumentRetriever>, default_top: usize) -> Self {
        Self {
            retriever,
            default_top,
        }
    }
}

/// "(source_id) text" 逐行格式，交给智能体阅读
fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No matching documents.".to_string();
    }
    hits.iter()
        .map(|h| format!("({}) {}", h.source_id, h.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        DOCUMENT_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "A document search engine. Use `*` as query to list everything. Args: {\"query\": \"...\", \"file_name\"?: \"...\", \"top\"?: 5, \"all_content\"?: false}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to search for."},
                "file_name": {"type": "string", "description": "The document name to search within."},
                "top": {"type": "integer", "description": "Number of results to return.", "default": self.default_top},
                "all_content": {"type": "boolean", "description": "Return every chunk of file_name in order."}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let file_name = args.get("file_name").and_then(Value::as_str).map(str::to_string);

        if args.get("all_content").and_then(Value::as_bool).unwrap_or(false) {
            let file = file_name.ok_or_else(|| "'all_content' requires 'file_name'".to_string())?;
            let hits = self.retriever.get_all_content(&file).await?;
            return Ok(render_hits(&hits));
        }

        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing 'query'".to_string())?;
        let filters = SearchFilters {
            file_name,
            top: args
                .get("top")
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or(self.default_top),
        };
        let hits = self.retriever.search(query, &filters).await?;
        Ok(render_hits(&hits))
    }
}
