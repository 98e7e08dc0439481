//! Supabase 关系表适配器（PostgREST + Realtime）
//!
//! 表列使用 snake_case，本地字段使用 camelCase，两者的转换只发生在这里。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::realtime::RealtimeChannel;
use super::{check_status, ChangeFeed, StoreError, StudentStore};
use crate::app::student::model::{normalize_date, StudentFields, StudentRecord};
use crate::infrastructure::config::SupabaseConfig;

/// 读取到的一行；所有列都可能缺失
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Row {
    id: Value,
    name: Option<String>,
    class: Option<String>,
    section: Option<String>,
    roll_number: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    parent_name: Option<String>,
    parent_phone: Option<String>,
    date_of_birth: Option<String>,
    blood_group: Option<String>,
    gender: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

/// 写入的一行（列名即表列名）
#[derive(Debug, Serialize)]
struct RowWrite<'a> {
    name: &'a str,
    class: &'a str,
    section: &'a str,
    roll_number: &'a str,
    address: &'a str,
    phone: &'a str,
    email: &'a str,
    parent_name: &'a str,
    parent_phone: &'a str,
    date_of_birth: &'a str,
    blood_group: &'a str,
    gender: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

impl<'a> RowWrite<'a> {
    fn from_fields(fields: &'a StudentFields) -> Self {
        Self {
            name: &fields.name,
            class: &fields.class_name,
            section: &fields.section,
            roll_number: &fields.roll_number,
            address: &fields.address,
            phone: &fields.phone,
            email: &fields.email,
            parent_name: &fields.parent_name,
            parent_phone: &fields.parent_phone,
            date_of_birth: &fields.date_of_birth,
            blood_group: &fields.blood_group,
            gender: &fields.gender,
            created_at: None,
            updated_at: None,
        }
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|| {
            // 没有时区的 timestamp 列按 UTC 处理
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|ts| ts.and_utc())
        })
}

impl From<Row> for StudentRecord {
    fn from(row: Row) -> Self {
        StudentRecord {
            id: id_text(&row.id),
            fields: StudentFields {
                name: row.name.unwrap_or_default(),
                class_name: row.class.unwrap_or_default(),
                section: row.section.unwrap_or_default(),
                roll_number: row.roll_number.unwrap_or_default(),
                address: row.address.unwrap_or_default(),
                phone: row.phone.unwrap_or_default(),
                email: row.email.unwrap_or_default(),
                parent_name: row.parent_name.unwrap_or_default(),
                parent_phone: row.parent_phone.unwrap_or_default(),
                date_of_birth: normalize_date(row.date_of_birth.as_deref().unwrap_or_default()),
                blood_group: row.blood_group.unwrap_or_default(),
                gender: row.gender.unwrap_or_default(),
            },
            created_at: parse_timestamp(row.created_at.as_deref()),
            updated_at: parse_timestamp(row.updated_at.as_deref()),
        }
    }
}

#[derive(Clone)]
pub struct SupabaseStore {
    http: reqwest::Client,
    config: Arc<SupabaseConfig>,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.table_url())
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .header("Accept-Profile", &self.config.schema)
            .header("Content-Profile", &self.config.schema)
    }

    /// 发送带 `return=representation` 的写请求并返回受影响的行
    async fn write(&self, req: reqwest::RequestBuilder) -> Result<Vec<Row>, StoreError> {
        let resp = req.header("Prefer", "return=representation").send().await?;
        check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StudentStore for SupabaseStore {
    fn backend(&self) -> &'static str {
        "supabase"
    }

    async fn list(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let resp = self
            .request(reqwest::Method::GET)
            .query(&[("select", "*"), ("order", "created_at.asc.nullsfirst,id.asc")])
            .send()
            .await?;
        let rows: Vec<Row> = check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(rows.into_iter().map(StudentRecord::from).collect())
    }

    async fn create(
        &self,
        fields: &StudentFields,
        created_at: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let mut row = RowWrite::from_fields(fields);
        row.created_at = Some(created_at);
        let rows = self
            .write(self.request(reqwest::Method::POST).json(&row))
            .await?;
        rows.first()
            .map(|r| id_text(&r.id))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Decode("插入结果中没有 id".to_string()))
    }

    async fn update(
        &self,
        id: &str,
        fields: &StudentFields,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut row = RowWrite::from_fields(fields);
        row.updated_at = Some(updated_at);
        let filter = format!("eq.{}", id);
        let rows = self
            .write(
                self.request(reqwest::Method::PATCH)
                    .query(&[("id", filter.as_str())])
                    .json(&row),
            )
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let filter = format!("eq.{}", id);
        let rows = self
            .write(
                self.request(reqwest::Method::DELETE)
                    .query(&[("id", filter.as_str())]),
            )
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeFeed, StoreError> {
        let channel = RealtimeChannel::join(
            &self.config.url,
            &self.config.anon_key,
            &self.config.schema,
            &self.config.table,
        )
        .await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let heartbeat = Duration::from_secs(self.config.heartbeat_seconds);
        let handle = tokio::spawn(channel.run(tx, heartbeat));
        Ok(ChangeFeed::new(rx, Some(handle.abort_handle())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_maps_snake_case_columns() {
        let row: Row = serde_json::from_value(json!({
            "id": 7,
            "name": "Ann",
            "class": "5",
            "roll_number": "42",
            "parent_name": "Beth",
            "date_of_birth": "2014-03-09T00:00:00+00:00",
            "created_at": "2024-01-02T03:04:05.123456+00:00",
            "updated_at": null
        }))
        .unwrap();

        let record = StudentRecord::from(row);
        assert_eq!(record.id, "7");
        assert_eq!(record.fields.roll_number, "42");
        assert_eq!(record.fields.parent_name, "Beth");
        assert_eq!(record.fields.date_of_birth, "2014-03-09");
        assert_eq!(record.fields.address, "");
        assert!(record.created_at.is_some());
        assert!(record.updated_at.is_none());
    }

    #[test]
    fn test_write_uses_column_names() {
        let fields = StudentFields {
            roll_number: "42".to_string(),
            class_name: "5".to_string(),
            parent_phone: "555".to_string(),
            ..Default::default()
        };
        let mut row = RowWrite::from_fields(&fields);
        row.updated_at = Some(Utc::now());
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["roll_number"], "42");
        assert_eq!(value["class"], "5");
        assert_eq!(value["parent_phone"], "555");
        assert!(value.get("rollNumber").is_none());
        assert!(value.get("created_at").is_none());
        assert!(value.get("updated_at").is_some());
    }

    #[test]
    fn test_uuid_ids_stay_text() {
        let row: Row = serde_json::from_value(json!({ "id": "0b7c7f0e-1111-2222-3333-444455556666" })).unwrap();
        assert_eq!(StudentRecord::from(row).id, "0b7c7f0e-1111-2222-3333-444455556666");
    }

    #[test]
    fn test_naive_timestamp_treated_as_utc() {
        let ts = parse_timestamp(Some("2024-01-02T03:04:05.5")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-02T03:04:05.500+00:00");
    }
}
