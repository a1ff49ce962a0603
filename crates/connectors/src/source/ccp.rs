//! CCP case-management report API.
//!
//! Every call is a GET to the same URL with a JSON body naming the
//! operation. Login yields an `Auth-Key` that is sent with the username on
//! every later call.

use crate::{
    error::SourceError,
    hash::record_hash,
    http::{build_client, check_source, unavailable},
    source::{coerce_int, dump_json, json_body},
};
use chrono::{NaiveDate, NaiveDateTime};
use model::records::record::Record;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{collections::BTreeSet, fmt};
use tracing::{debug, info};

const API_DATE_FORMAT: &str = "%d-%m-%Y";
const EXPIRED_TOKEN_ERRORS: [&str; 2] = ["Invalid or token expired", "Expired token"];

#[derive(Clone, Deserialize)]
pub struct CcpCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

impl fmt::Debug for CcpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CcpCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct CcpClient {
    client: Client,
    credentials: CcpCredentials,
}

/// An authenticated CCP session. One per run; an expired key is reported
/// as an auth failure rather than renewed.
pub struct CcpSession<'a> {
    api: &'a CcpClient,
    key: String,
}

impl CcpClient {
    pub fn new(credentials: CcpCredentials) -> Result<Self, SourceError> {
        let client = build_client(credentials.proxy.as_deref())?;
        Ok(CcpClient {
            client,
            credentials,
        })
    }

    pub async fn login(&self) -> Result<CcpSession<'_>, SourceError> {
        let url = &self.credentials.url;
        let body = json!({
            "login": true,
            "username": self.credentials.username,
            "password": self.credentials.password,
        });
        let resp = self
            .client
            .get(url)
            .json(&body)
            .send()
            .await
            .map_err(unavailable(url))?;
        let resp = check_source(url, resp).await?;
        let data = json_body(url, resp).await?;

        if data.get("result").and_then(Value::as_str) != Some("success") {
            return Err(SourceError::Auth(format!(
                "CCP login unsuccessful: {}",
                data.get("error").and_then(Value::as_str).unwrap_or("unknown error")
            )));
        }
        let key = data
            .get("Auth-Key")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::Malformed {
                url: url.clone(),
                message: "login response has no Auth-Key".into(),
            })?;

        info!(username = %self.credentials.username, "Logged in to CCP");
        Ok(CcpSession {
            api: self,
            key: key.to_string(),
        })
    }
}

impl CcpSession<'_> {
    fn url(&self) -> &str {
        &self.api.credentials.url
    }

    async fn call(&self, body: Value) -> Result<Vec<Value>, SourceError> {
        let url = self.url();
        let resp = self
            .api
            .client
            .get(url)
            .header("Auth-Key", &self.key)
            .header("Username", &self.api.credentials.username)
            .json(&body)
            .send()
            .await
            .map_err(unavailable(url))?;
        let resp = check_source(url, resp).await?;
        let data = json_body(url, resp).await?;

        match data.get("result").and_then(Value::as_str) {
            Some("success") => match data.get("data") {
                Some(Value::Array(items)) => Ok(items.clone()),
                Some(Value::Null) | None => Ok(Vec::new()),
                Some(_) => Err(SourceError::Malformed {
                    url: url.to_string(),
                    message: "`data` is not an array".into(),
                }),
            },
            Some("failed")
                if data
                    .get("error")
                    .and_then(Value::as_str)
                    .is_some_and(|e| EXPIRED_TOKEN_ERRORS.contains(&e)) =>
            {
                Err(SourceError::Auth("CCP auth key expired".into()))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn objects(&self, items: Vec<Value>) -> Result<Vec<Record>, SourceError> {
        items
            .into_iter()
            .map(|item| {
                Record::from_value(item).ok_or_else(|| SourceError::Malformed {
                    url: self.url().to_string(),
                    message: "record is not a JSON object".into(),
                })
            })
            .collect()
    }

    /// Patient training sessions held on `day`, hashed and typed.
    pub async fn patient_training(&self, day: NaiveDate) -> Result<Vec<Record>, SourceError> {
        let items = self
            .call(json!({
                "get_total_ccp_class_attendancedata": true,
                "date": day.format(API_DATE_FORMAT).to_string(),
            }))
            .await?;
        debug!(%day, rows = items.len(), "Fetched patient training sessions");
        self.objects(items)?
            .into_iter()
            .map(|raw| patient_session_row(raw).map_err(|m| self.malformed(m)))
            .collect()
    }

    /// Nurse training sessions held on `day`, hashed and typed.
    pub async fn nurse_training(&self, day: NaiveDate) -> Result<Vec<Record>, SourceError> {
        let items = self
            .call(json!({
                "get_total_nurse_training_sessiondata": true,
                "date": day.format(API_DATE_FORMAT).to_string(),
            }))
            .await?;
        debug!(%day, rows = items.len(), "Fetched nurse training sessions");
        self.objects(items)?
            .into_iter()
            .map(|raw| nurse_session_row(raw).map_err(|m| self.malformed(m)))
            .collect()
    }

    pub async fn nurse_details(&self, phone: &str) -> Result<Vec<Record>, SourceError> {
        let items = self
            .call(json!({ "get_nurses_detailes_data": true, "username": phone }))
            .await?;
        let tail = phone.get(phone.len().saturating_sub(4)..).unwrap_or(phone);
        debug!(phone_tail = %tail, rows = items.len(), "Fetched nurse details");
        self.objects(items)?
            .into_iter()
            .map(|raw| nurse_row(raw).map_err(|m| self.malformed(m)))
            .collect()
    }

    fn malformed(&self, message: String) -> SourceError {
        SourceError::Malformed {
            url: self.url().to_string(),
            message,
        }
    }
}

/// Phone numbers of everyone who ran or attended the given sessions, sorted
/// and without duplicates.
pub fn session_phones(patient_sessions: &[Record], nurse_sessions: &[Record]) -> Vec<String> {
    let mut phones = BTreeSet::new();
    for session in patient_sessions {
        if let Some(list) = session.get_str("session_conducted_by") {
            phones.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from),
            );
        }
    }
    for session in nurse_sessions {
        for field in ["trainerdata1", "traineesdata1"] {
            let Some(people) = session.get(&format!("{field}_raw")).and_then(Value::as_array) else {
                continue;
            };
            for person in people {
                if let Some(phone) = person.get("phone_no").and_then(Value::as_str) {
                    phones.insert(phone.to_string());
                }
            }
        }
    }
    phones.into_iter().collect()
}

fn reformat_date(record: &mut Record, field: &str) -> Result<(), String> {
    let Some(raw) = record.get_str(field) else {
        return Ok(());
    };
    let date = NaiveDate::parse_from_str(raw, API_DATE_FORMAT)
        .map_err(|e| format!("bad {field} {raw:?}: {e}"))?;
    record.insert(field, date.format("%Y-%m-%d").to_string());
    Ok(())
}

fn coerce_ints(record: &mut Record, fields: &[&str]) {
    for field in fields {
        if let Some(value) = record.get(field).map(coerce_int) {
            record.insert(*field, value);
        }
    }
}

fn dump_nested(record: &mut Record, fields: &[&str]) {
    for field in fields {
        if let Some(value) = record.get(field).map(dump_json) {
            record.insert(*field, value);
        }
    }
}

pub fn patient_session_row(mut record: Record) -> Result<Record, String> {
    let md5 = record_hash(&record.clone().into_value());
    record.insert("md5", md5);
    coerce_ints(
        &mut record,
        &["mothers_trained", "family_members_trained", "total_trained"],
    );
    reformat_date(&mut record, "date_of_session")?;
    dump_nested(&mut record, &["data1"]);
    Ok(record)
}

/// Nurse-training rows keep the untouched trainer/trainee arrays under
/// `*_raw` keys until phone numbers have been collected; see
/// [`strip_raw_people`].
pub fn nurse_session_row(mut record: Record) -> Result<Record, String> {
    let md5 = record_hash(&record.clone().into_value());
    record.insert("md5", md5);
    coerce_ints(&mut record, &["totalmaster_trainer", "total_trainees"]);
    reformat_date(&mut record, "sessiondateandtime")?;
    for field in ["trainerdata1", "traineesdata1"] {
        if let Some(raw) = record.get(field).cloned() {
            record.insert(format!("{field}_raw"), raw);
        }
    }
    dump_nested(&mut record, &["trainerdata1", "traineesdata1"]);
    Ok(record)
}

pub fn strip_raw_people(record: &mut Record) {
    record.remove("trainerdata1_raw");
    record.remove("traineesdata1_raw");
}

pub fn nurse_row(mut record: Record) -> Result<Record, String> {
    if let Some(raw) = record.get_str("user_created_dateandtime") {
        let ts = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| format!("bad user_created_dateandtime {raw:?}: {e}"))?;
        record.insert(
            "user_created_dateandtime",
            ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
        );
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method},
    };

    fn credentials(server: &MockServer) -> CcpCredentials {
        CcpCredentials {
            url: format!("{}/api", server.uri()),
            username: "reporter".into(),
            password: "pw".into(),
            proxy: None,
        }
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("GET"))
            .and(body_partial_json(json!({"login": true, "username": "reporter"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "success", "Auth-Key": "k1"})),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_patient_training_maps_fields() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(header("Auth-Key", "k1"))
            .and(header("Username", "reporter"))
            .and(body_partial_json(json!({"date": "09-06-2024"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "data": [{
                    "date_of_session": "09-06-2024",
                    "mothers_trained": "4",
                    "session_conducted_by": "111, 222",
                    "data1": [{"a": 1}],
                }],
            })))
            .mount(&server)
            .await;

        let api = CcpClient::new(credentials(&server)).unwrap();
        let session = api.login().await.unwrap();
        let rows = session
            .patient_training(NaiveDate::from_ymd_opt(2024, 6, 9).unwrap())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get_str("date_of_session"), Some("2024-06-09"));
        assert_eq!(row.get("mothers_trained"), Some(&json!(4)));
        assert_eq!(row.get_str("data1"), Some("[{\"a\": 1}]"));
        assert_eq!(row.get_str("md5").map(str::len), Some(32));
        assert_eq!(session_phones(&rows, &[]), vec!["111", "222"]);
    }

    #[tokio::test]
    async fn test_expired_key_is_auth_failure() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(header("Auth-Key", "k1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "failed", "error": "Expired token"})),
            )
            .mount(&server)
            .await;

        let api = CcpClient::new(credentials(&server)).unwrap();
        let session = api.login().await.unwrap();
        let err = session
            .nurse_training(NaiveDate::from_ymd_opt(2024, 6, 9).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_failed_result_means_no_rows() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(header("Auth-Key", "k1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "failed", "error": "No data"})),
            )
            .mount(&server)
            .await;

        let api = CcpClient::new(credentials(&server)).unwrap();
        let session = api.login().await.unwrap();
        let rows = session.nurse_details("9999900000").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "failed", "error": "bad password"})),
            )
            .mount(&server)
            .await;

        let api = CcpClient::new(credentials(&server)).unwrap();
        assert!(matches!(api.login().await, Err(SourceError::Auth(_))));
    }

    #[test]
    fn test_nurse_session_phones_and_strip() {
        let raw = Record::from_value(json!({
            "sessiondateandtime": "01-05-2024",
            "total_trainees": "2",
            "trainerdata1": [{"phone_no": "333"}],
            "traineesdata1": [{"phone_no": "444"}, {"phone_no": "333"}],
        }))
        .unwrap();
        let mut row = nurse_session_row(raw).unwrap();
        assert_eq!(row.get_str("sessiondateandtime"), Some("2024-05-01"));
        assert_eq!(row.get("total_trainees"), Some(&json!(2)));
        assert_eq!(session_phones(&[], std::slice::from_ref(&row)), vec!["333", "444"]);

        strip_raw_people(&mut row);
        assert!(!row.contains("trainerdata1_raw"));
        assert!(row.get_str("trainerdata1").is_some());
    }

    #[test]
    fn test_bad_session_date_is_rejected() {
        let raw = Record::from_value(json!({"date_of_session": "2024/06/09"})).unwrap();
        assert!(patient_session_row(raw).is_err());
    }
}
