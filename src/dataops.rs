// Data operations
// Thin typed wrappers that compile dataset queries into requests for the executer

use reqwest::Url;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::API_DATA;
use crate::error::{Result, SdkError};
use crate::executer::RequestExecuter;
use crate::transport::RequestMethod;

/// Kind of a dataset query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAction {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryAction {
    pub fn method(self) -> RequestMethod {
        match self {
            QueryAction::Select => RequestMethod::Get,
            QueryAction::Insert => RequestMethod::Post,
            QueryAction::Update => RequestMethod::Patch,
            QueryAction::Delete => RequestMethod::Delete,
        }
    }
}

/// Compiled dataset request
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequest {
    pub dataset: String,
    pub action: QueryAction,
    /// Fields returned in the response, all when empty
    pub fields: Vec<String>,
    pub body: Option<Value>,
}

impl DataRequest {
    pub fn new(dataset: impl Into<String>, action: QueryAction) -> Self {
        Self {
            dataset: dataset.into(),
            action,
            fields: Vec::new(),
            body: None,
        }
    }

    /// Full request URL below `project_url`
    pub fn url(&self, project_url: &str) -> Result<String> {
        let mut url = Url::parse(&format!(
            "{}/{}/{}",
            project_url.trim_end_matches('/'),
            API_DATA,
            self.dataset
        ))
        .map_err(|e| SdkError::Config(format!("Invalid dataset URL: {}", e)))?;

        if !self.fields.is_empty() {
            let outputs = serde_json::to_string(&self.fields)?;
            url.query_pairs_mut().append_pair("outputs", &outputs);
        }

        Ok(url.to_string())
    }
}

/// Handle to one dataset, records typed as `T`
pub struct Dataset<T> {
    name: String,
    executer: Arc<RequestExecuter>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            executer: Arc::clone(&self.executer),
            _record: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Dataset<T> {
    pub fn new(name: impl Into<String>, executer: Arc<RequestExecuter>) -> Self {
        Self {
            name: name.into(),
            executer,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same dataset, authenticated with the token of `alias`
    pub fn with_auth(&self, alias: impl Into<String>) -> Self {
        Self::new(
            self.name.clone(),
            Arc::new(self.executer.as_ref().clone().with_alias(alias)),
        )
    }

    pub fn select(&self) -> DataQuery<T> {
        DataQuery::new(self, QueryAction::Select, Ok(None))
    }

    pub fn insert(&self, records: Vec<T>) -> DataQuery<T> {
        let body = serde_json::to_value(records).map(Some).map_err(SdkError::from);
        DataQuery::new(self, QueryAction::Insert, body)
    }

    /// Apply `changes` (a partial record) to the dataset
    pub fn update(&self, changes: Value) -> DataQuery<T> {
        DataQuery::new(self, QueryAction::Update, Ok(Some(changes)))
    }

    pub fn delete(&self) -> DataQuery<T> {
        DataQuery::new(self, QueryAction::Delete, Ok(None))
    }
}

/// Query against a dataset, sent by `execute()`
pub struct DataQuery<T> {
    executer: Arc<RequestExecuter>,
    request: DataRequest,
    body: Result<Option<Value>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> DataQuery<T> {
    fn new(dataset: &Dataset<T>, action: QueryAction, body: Result<Option<Value>>) -> Self {
        Self {
            executer: Arc::clone(&dataset.executer),
            request: DataRequest::new(dataset.name.clone(), action),
            body,
            _record: PhantomData,
        }
    }

    /// Select the fields returned for the affected records
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Request this query would send
    pub fn request(&self) -> &DataRequest {
        &self.request
    }

    /// Execute the query and return the affected records
    pub async fn execute(self) -> Result<Vec<T>> {
        let mut request = self.request;
        request.body = self.body?;

        let value = self.executer.execute_request(request).await?;
        decode_records(value)
    }
}

fn decode_records<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        record => Ok(vec![serde_json::from_value(record)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Post {
        title: String,
    }

    #[test]
    fn test_action_methods() {
        assert_eq!(QueryAction::Select.method(), RequestMethod::Get);
        assert_eq!(QueryAction::Insert.method(), RequestMethod::Post);
        assert_eq!(QueryAction::Update.method(), RequestMethod::Patch);
        assert_eq!(QueryAction::Delete.method(), RequestMethod::Delete);
    }

    #[test]
    fn test_request_url() {
        let request = DataRequest::new("posts", QueryAction::Select);
        assert_eq!(
            request.url("https://p1.app.jexia.com:443").unwrap(),
            "https://p1.app.jexia.com/ds/posts"
        );

        let mut request = DataRequest::new("posts", QueryAction::Select);
        request.fields = vec!["title".to_string(), "published".to_string()];
        assert_eq!(
            request.url("http://localhost:8080/").unwrap(),
            "http://localhost:8080/ds/posts?outputs=%5B%22title%22%2C%22published%22%5D"
        );
    }

    #[test]
    fn test_decode_records() {
        let posts: Vec<Post> = decode_records(json!([{"title": "a"}, {"title": "b"}])).unwrap();
        assert_eq!(posts.len(), 2);

        let posts: Vec<Post> = decode_records(json!({"title": "single"})).unwrap();
        assert_eq!(posts, vec![Post { title: "single".to_string() }]);

        let posts: Vec<Post> = decode_records(Value::Null).unwrap();
        assert!(posts.is_empty());

        let err = decode_records::<Post>(json!([{"name": "x"}])).unwrap_err();
        assert!(matches!(err, SdkError::InvalidResponse(_)));
    }
}
