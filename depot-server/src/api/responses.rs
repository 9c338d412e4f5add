use std::collections::BTreeMap;
use std::io;

use bytes::Bytes;
use futures::io::{AsyncRead, AsyncReadExt};
use http_body_util::{combinators::BoxBody, BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::{Response, StatusCode};
use serde::Serialize;

use depot_storage::{DepotError, FileRecord};

pub type Body = BoxBody<Bytes, io::Error>;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Wire status codes, kept bit-compatible with the legacy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrCode {
    Ok = 0,
    FileExistDir = 1,
    GetContent = 10,
    ReqParameterExpire = 20,
    ReqParameterPath = 21,
    UpdateDb = 30,
    ReadDb = 31,
    Mkdir = 40,
    OpenFile = 50,
    FileNotInDb = 60,
    FileNotExist = 70,
}

impl ErrCode {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrCode::Ok => "OK",
            ErrCode::FileExistDir => "File exist, it is directory",
            ErrCode::GetContent => "get HTTP content error",
            ErrCode::ReqParameterExpire => "request expired time format error",
            ErrCode::ReqParameterPath => "request path error",
            ErrCode::UpdateDb => "update db error",
            ErrCode::ReadDb => "read db error",
            ErrCode::Mkdir => "mkdir error",
            ErrCode::OpenFile => "open file error",
            ErrCode::FileNotInDb => "file not exist in db",
            ErrCode::FileNotExist => "file not exist",
        }
    }
}

pub fn err_code_for(err: &DepotError) -> ErrCode {
    match err {
        DepotError::InvalidPath(_) => ErrCode::ReqParameterPath,
        DepotError::InvalidExpiry(_) => ErrCode::ReqParameterExpire,
        DepotError::PathIsDirectory(_) => ErrCode::FileExistDir,
        DepotError::DirectoryCreate(_) => ErrCode::Mkdir,
        DepotError::Io(_) => ErrCode::OpenFile,
        DepotError::UpstreamDecode(_) => ErrCode::GetContent,
        DepotError::MetaRead(_) => ErrCode::ReadDb,
        DepotError::MetaWrite(_) => ErrCode::UpdateDb,
        DepotError::NotFoundInMetadata(_) => ErrCode::FileNotInDb,
        DepotError::NotFoundOnDisk(_) => ErrCode::FileNotExist,
    }
}

/// One file record in wire form.
#[derive(Serialize)]
pub struct FileInfoJson {
    #[serde(rename = "CreateTime")]
    pub create_time: String,
    #[serde(rename = "Md5")]
    pub md5: String,
    #[serde(rename = "ExpiredTime")]
    pub expired_time: String,
    #[serde(rename = "DownloadPath", skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
}

impl FileInfoJson {
    pub fn new(record: &FileRecord, download_path: Option<String>) -> Self {
        Self {
            create_time: record.created_at().to_rfc3339(),
            md5: record.hash_hex(),
            expired_time: record.expires_at().to_rfc3339(),
            download_path,
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(rename = "Status")]
    pub status: u32,
    #[serde(rename = "Msg")]
    pub msg: String,
    #[serde(rename = "File")]
    pub file: FileInfoJson,
}

#[derive(Serialize)]
pub struct InfoResponse {
    #[serde(rename = "Status")]
    pub status: u32,
    #[serde(rename = "Msg")]
    pub msg: String,
    #[serde(rename = "File", skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfoJson>,
    #[serde(rename = "AllFile", skip_serializing_if = "Option::is_none")]
    pub all_file: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct CleanResponse {
    #[serde(rename = "Status")]
    pub status: u32,
    #[serde(rename = "Msg")]
    pub msg: String,
    #[serde(rename = "NumDeletedFiles")]
    pub num_deleted_files: usize,
    #[serde(rename = "DeletedFiles")]
    pub deleted_files: BTreeMap<String, FileInfoJson>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(rename = "Status")]
    pub status: u32,
    #[serde(rename = "Msg")]
    pub msg: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "FileNumber")]
    pub file_number: u64,
}

pub fn full_body(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed()
}

/// Chunked body streaming from an async reader.
pub fn stream_body(reader: Box<dyn AsyncRead + Send + Sync + Unpin>) -> Body {
    let stream = futures::stream::try_unfold(reader, |mut reader| async move {
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let n = reader.read(&mut buf).await?;
        Ok(if n == 0 {
            None
        } else {
            buf.truncate(n);
            Some((Frame::data(Bytes::from(buf)), reader))
        })
    });
    StreamBody::new(stream).boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Response<Body> {
    let json = serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("content-type", "application/json; charset=utf-8")
        .body(full_body(json))
        .unwrap()
}

/// Error envelope with the legacy wire code; HTTP status stays 200,
/// the `Status` field carries the outcome.
pub fn error_envelope(err: &DepotError) -> Response<Body> {
    let code = err_code_for(err);
    tracing::warn!(code = code.code(), error = %err, "request failed");
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "Status": code.code(), "Msg": code.message() }),
    )
}

pub fn plain_error(status: StatusCode, message: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(full_body(message.to_string()))
        .unwrap()
}

pub fn not_found() -> Response<Body> {
    plain_error(StatusCode::NOT_FOUND, "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_legacy_table() {
        assert_eq!(err_code_for(&DepotError::InvalidPath(String::new())).code(), 21);
        assert_eq!(err_code_for(&DepotError::InvalidExpiry(String::new())).code(), 20);
        assert_eq!(err_code_for(&DepotError::PathIsDirectory(String::new())).code(), 1);
        assert_eq!(err_code_for(&DepotError::NotFoundInMetadata(String::new())).code(), 60);
        assert_eq!(err_code_for(&DepotError::NotFoundOnDisk(String::new())).code(), 70);
        assert_eq!(ErrCode::Ok.code(), 0);
        assert_eq!(ErrCode::Ok.message(), "OK");
    }

    #[test]
    fn file_info_serializes_with_legacy_field_names() {
        let record = depot_storage::FileRecord::new([0u8; 16], std::time::Duration::from_secs(60));
        let info = FileInfoJson::new(&record, Some("http://host/r/download/x".into()));
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("CreateTime").is_some());
        assert!(json.get("Md5").is_some());
        assert!(json.get("ExpiredTime").is_some());
        assert!(json.get("DownloadPath").is_some());

        let no_link = FileInfoJson::new(&record, None);
        let json = serde_json::to_value(&no_link).unwrap();
        assert!(json.get("DownloadPath").is_none());
    }
}
