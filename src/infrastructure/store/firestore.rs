//! Firestore 文档库适配器（REST）
//!
//! 文档字段与本地字段同名（camelCase），值使用 Firestore 的类型化表示
//! （`stringValue`、`timestampValue` ...）。变更通知通过监听任务实现：
//! 定期以及每次本地写入后重新读取整个集合，快照变化时推送完整快照。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{check_status, ChangeFeed, ChangeNotice, StoreError, StudentStore};
use crate::app::student::model::{normalize_date, StudentFields, StudentRecord};
use crate::infrastructure::config::FirestoreConfig;

/// 用户可编辑字段在文档中的名称
const USER_FIELDS: [&str; 12] = [
    "name",
    "class",
    "section",
    "rollNumber",
    "address",
    "phone",
    "email",
    "parentName",
    "parentPhone",
    "dateOfBirth",
    "bloodGroup",
    "gender",
];

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Clone)]
pub struct FirestoreStore {
    http: reqwest::Client,
    config: Arc<FirestoreConfig>,
    /// 本地写入计数，用来唤醒监听任务
    writes: Arc<watch::Sender<u64>>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Self {
        let (writes, _) = watch::channel(0);
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
            writes: Arc::new(writes),
        }
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents/{}",
            self.config.firestore_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.database,
            self.config.collection
        )
    }

    /// 文档地址；id 只能是集合下的单个路径段
    fn document_url(&self, id: &str) -> Result<reqwest::Url, StoreError> {
        if id.is_empty() || id == "." || id == ".." || id.contains('/') {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let mut url = reqwest::Url::parse(&self.collection_url())
            .map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.collection_url()))?
            .push(id);
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, url)
            .query(&[("key", self.config.api_key.as_str())]);
        if let Some(token) = &self.config.access_token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn bump_writes(&self) {
        self.writes.send_modify(|n| *n = n.wrapping_add(1));
    }
}

#[async_trait]
impl StudentStore for FirestoreStore {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn list(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        // 跟随 nextPageToken 读完整个集合，快照必须是全量的
        loop {
            let mut req = self
                .request(reqwest::Method::GET, self.collection_url())
                .query(&[("pageSize", "300")]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let resp = check_status(req.send().await?).await?;
            let page: ListResponse = resp
                .json()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            records.extend(page.documents.iter().map(decode_document));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(records)
    }

    async fn create(
        &self,
        fields: &StudentFields,
        created_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let mut body = encode_fields(fields);
        body.insert("createdAt".to_string(), timestamp_value(created_at));
        let resp = self
            .request(reqwest::Method::POST, self.collection_url())
            .json(&json!({ "fields": body }))
            .send()
            .await?;
        let doc: Document = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        self.bump_writes();
        Ok(document_id(&doc.name).to_string())
    }

    async fn update(
        &self,
        id: &str,
        fields: &StudentFields,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut body = encode_fields(fields);
        body.insert("updatedAt".to_string(), timestamp_value(updated_at));
        let mut mask: Vec<(&str, &str)> = USER_FIELDS
            .iter()
            .map(|f| ("updateMask.fieldPaths", *f))
            .collect();
        mask.push(("updateMask.fieldPaths", "updatedAt"));
        mask.push(("currentDocument.exists", "true"));
        let resp = self
            .request(reqwest::Method::PATCH, self.document_url(id)?)
            .query(&mask)
            .json(&json!({ "fields": body }))
            .send()
            .await?;
        check_status(resp).await.map_err(|e| not_found_as(e, id))?;
        self.bump_writes();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        // 不带前置条件时删除不存在的文档也返回 200
        let resp = self
            .request(reqwest::Method::DELETE, self.document_url(id)?)
            .query(&[("currentDocument.exists", "true")])
            .send()
            .await?;
        check_status(resp).await.map_err(|e| not_found_as(e, id))?;
        self.bump_writes();
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let writes = self.writes.subscribe();
        let period = Duration::from_millis(self.config.poll_interval_ms);
        let handle = tokio::spawn(watch_collection(store, writes, tx, period));
        Ok(ChangeFeed::new(rx, Some(handle.abort_handle())))
    }
}

/// 监听任务：定期或写入后重新读取，快照变化才推送
async fn watch_collection(
    store: FirestoreStore,
    mut writes: watch::Receiver<u64>,
    tx: mpsc::UnboundedSender<ChangeNotice>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<Vec<StudentRecord>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = writes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        match store.list().await {
            Ok(rows) => {
                if last.as_ref() == Some(&rows) {
                    continue;
                }
                debug!("Firestore 集合发生变化，共 {} 条文档", rows.len());
                last = Some(rows.clone());
                if tx.send(ChangeNotice::Snapshot(rows)).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Firestore 集合读取失败: {}", e),
        }
    }
}

/// currentDocument.exists 前置条件不满足时后端返回 404
fn not_found_as(err: StoreError, id: &str) -> StoreError {
    match err {
        StoreError::Backend { status: 404, .. } => StoreError::NotFound(id.to_string()),
        e => e,
    }
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn timestamp_value(ts: DateTime<Utc>) -> Value {
    json!({ "timestampValue": ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true) })
}

fn encode_fields(fields: &StudentFields) -> Map<String, Value> {
    let values = [
        &fields.name,
        &fields.class_name,
        &fields.section,
        &fields.roll_number,
        &fields.address,
        &fields.phone,
        &fields.email,
        &fields.parent_name,
        &fields.parent_phone,
        &fields.date_of_birth,
        &fields.blood_group,
        &fields.gender,
    ];
    USER_FIELDS
        .iter()
        .zip(values)
        .map(|(key, value)| (key.to_string(), string_value(value)))
        .collect()
}

/// 取出类型化值的文本表示；缺失或无法识别时为空串
fn text_of(fields: &Map<String, Value>, key: &str) -> String {
    let Some(Value::Object(value)) = fields.get(key) else {
        return String::new();
    };
    for kind in ["stringValue", "timestampValue", "integerValue"] {
        if let Some(Value::String(s)) = value.get(kind) {
            return s.clone();
        }
    }
    match (value.get("doubleValue"), value.get("booleanValue")) {
        (Some(v), _) | (None, Some(v)) => v.to_string(),
        _ => String::new(),
    }
}

fn timestamp_of(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    fields
        .get(key)
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn decode_document(doc: &Document) -> StudentRecord {
    let f = &doc.fields;
    StudentRecord {
        id: document_id(&doc.name).to_string(),
        fields: StudentFields {
            name: text_of(f, "name"),
            class_name: text_of(f, "class"),
            section: text_of(f, "section"),
            roll_number: text_of(f, "rollNumber"),
            address: text_of(f, "address"),
            phone: text_of(f, "phone"),
            email: text_of(f, "email"),
            parent_name: text_of(f, "parentName"),
            parent_phone: text_of(f, "parentPhone"),
            date_of_birth: normalize_date(&text_of(f, "dateOfBirth")),
            blood_group: text_of(f, "bloodGroup"),
            gender: text_of(f, "gender"),
        },
        created_at: timestamp_of(f, "createdAt"),
        updated_at: timestamp_of(f, "updatedAt"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{StatusCode, Uri};
    use std::collections::HashMap;

    fn store_at(base: &str) -> FirestoreStore {
        FirestoreStore::new(FirestoreConfig {
            project_id: "p".to_string(),
            firestore_url: base.to_string(),
            ..Default::default()
        })
    }

    /// 按 Firestore 语义应答：带 exists 前置条件且文档不存在时 404
    async fn fake_documents(
        uri: Uri,
        Query(params): Query<HashMap<String, String>>,
    ) -> StatusCode {
        let exists = uri.path().ends_with("/documents/students/known");
        let guarded = params.get("currentDocument.exists").map(String::as_str) == Some("true");
        if guarded && !exists {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::OK
        }
    }

    async fn serve_fake() -> String {
        let app = axum::Router::new().fallback(fake_documents);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    #[test]
    fn test_document_url_stays_in_collection() {
        let store = store_at("https://firestore.googleapis.com/v1");
        for id in ["../classes/c1", "..", ".", "", "a/b"] {
            assert!(
                matches!(store.document_url(id), Err(StoreError::NotFound(_))),
                "id {:?} accepted",
                id
            );
        }

        let url = store.document_url("a?b#c").unwrap();
        let req = store.request(reqwest::Method::DELETE, url).build().unwrap();
        assert_eq!(
            req.url().path(),
            "/v1/projects/p/databases/(default)/documents/students/a%3Fb%23c"
        );
        assert_eq!(req.url().query(), Some("key="));
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let store = store_at(&serve_fake().await);
        store.delete("known").await.unwrap();

        let err = store.delete("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));

        let err = store
            .update("missing", &StudentFields::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn test_decode_document_maps_typed_values() {
        let doc: Document = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/students/abc123",
            "fields": {
                "name": { "stringValue": "Ann" },
                "class": { "stringValue": "5" },
                "rollNumber": { "integerValue": "42" },
                "dateOfBirth": { "timestampValue": "2014-03-09T00:00:00Z" },
                "createdAt": { "timestampValue": "2024-01-02T03:04:05.123456Z" }
            }
        }))
        .unwrap();

        let record = decode_document(&doc);
        assert_eq!(record.id, "abc123");
        assert_eq!(record.fields.name, "Ann");
        assert_eq!(record.fields.class_name, "5");
        assert_eq!(record.fields.roll_number, "42");
        assert_eq!(record.fields.date_of_birth, "2014-03-09");
        assert_eq!(record.fields.section, "");
        assert!(record.created_at.is_some());
        assert!(record.updated_at.is_none());
    }

    #[test]
    fn test_encode_fields_uses_document_names() {
        let fields = StudentFields {
            roll_number: "42".to_string(),
            class_name: "5".to_string(),
            ..Default::default()
        };
        let encoded = encode_fields(&fields);
        assert_eq!(encoded.len(), USER_FIELDS.len());
        assert_eq!(encoded["rollNumber"], json!({ "stringValue": "42" }));
        assert_eq!(encoded["class"], json!({ "stringValue": "5" }));
    }

    #[test]
    fn test_encode_then_decode_keeps_user_fields() {
        let fields = StudentFields {
            name: "Ann".to_string(),
            date_of_birth: "2014-03-09".to_string(),
            blood_group: "AB-".to_string(),
            ..Default::default()
        };
        let doc = Document {
            name: "students/x".to_string(),
            fields: encode_fields(&fields),
        };
        assert_eq!(decode_document(&doc).fields, fields);
    }

    #[test]
    fn test_empty_list_response() {
        let page: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(page.documents.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
