use std::collections::HashMap;

use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use mongodb::Database;

use crate::error::AppError;

use super::flow::FormDef;

/// 动态表单提交落到文档库,集合名由表单定义决定
pub struct FormSubmission;

impl FormSubmission {
    pub fn build_document(
        def: &FormDef,
        values: &HashMap<String, String>,
        file_urls: &HashMap<String, String>,
        user_id: &str,
        user_email: &str,
    ) -> Document {
        let mut document = Document::new();
        for (name, value) in values {
            document.insert(name.clone(), Bson::String(value.clone()));
        }

        let mut files = Document::new();
        for (name, url) in file_urls {
            files.insert(name.clone(), Bson::String(url.clone()));
        }
        if !files.is_empty() {
            document.insert("files", files);
        }

        // 三个控制字段固定追加,后台检索都依赖它们
        document.insert("collection", def.collection);
        document.insert("form_id", def.form_id);
        document.insert("user_email", user_email);

        document.insert("user_id", user_id);
        document.insert("status", "received");
        document.insert(
            "submitted_at",
            mongodb::bson::DateTime::now(),
        );
        document
    }

    pub async fn insert(
        mongo: &Database,
        collection: &str,
        document: Document,
    ) -> Result<String, AppError> {
        let result = mongo
            .collection::<Document>(collection)
            .insert_one(document)
            .await?;

        let id = match result.inserted_id {
            Bson::ObjectId(oid) => oid.to_hex(),
            other => other.to_string(),
        };
        Ok(id)
    }

    pub async fn list(
        mongo: &Database,
        collection: &str,
        limit: i64,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let documents: Vec<Document> = mongo
            .collection::<Document>(collection)
            .find(doc! {})
            .sort(doc! { "submitted_at": -1 })
            .limit(limit)
            .await?
            .try_collect()
            .await?;

        let values = documents
            .into_iter()
            .map(|d| serde_json::to_value(&d).unwrap_or(serde_json::Value::Null))
            .collect();
        Ok(values)
    }

    pub async fn set_status(
        mongo: &Database,
        collection: &str,
        submission_id: &str,
        status: &str,
    ) -> Result<(), AppError> {
        let oid = ObjectId::parse_str(submission_id)
            .map_err(|_| AppError::field("submission_id", "malformed id"))?;

        let result = mongo
            .collection::<Document>(collection)
            .update_one(doc! { "_id": oid }, doc! { "$set": { "status": status } })
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound("submission".into()));
        }
        Ok(())
    }
}

/// 上传签发记录,对象键和归属人留档备查
pub struct UploadRecord;

impl UploadRecord {
    pub async fn record(
        mongo: &Database,
        key: &str,
        url: &str,
        content_type: &str,
        size: u64,
        user_id: &str,
    ) -> Result<(), AppError> {
        mongo
            .collection::<Document>("uploads")
            .insert_one(doc! {
                "key": key,
                "url": url,
                "content_type": content_type,
                "size": size as i64,
                "user_id": user_id,
                "created_at": mongodb::bson::DateTime::now(),
            })
            .await?;
        Ok(())
    }

    pub async fn owns_key(
        mongo: &Database,
        key: &str,
        user_id: &str,
    ) -> Result<bool, AppError> {
        let found = mongo
            .collection::<Document>("uploads")
            .find_one(doc! { "key": key, "user_id": user_id })
            .await?;
        Ok(found.is_some())
    }
}
