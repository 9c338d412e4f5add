use std::collections::HashMap;
use std::io;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures::io::AsyncRead;
use futures::{StreamExt, TryStreamExt};
use http_body_util::BodyStream;
use hyper::body::Incoming;
use hyper::header::{
    ACCEPT_ENCODING, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST,
    IF_MODIFIED_SINCE, LAST_MODIFIED,
};
use hyper::{Request, Response, StatusCode, Uri};
use tracing::debug;

use depot_storage::{ContentEncoding, Depot, DepotError, IngestOutcome, OverwritePolicy};

use super::responses::{
    self, Body, CleanResponse, ErrCode, FileInfoJson, InfoResponse, StatusResponse, UploadResponse,
};

const DEFAULT_EXPIRED_TIME: &str = "2400h";

pub async fn upload(depot: &Depot, req: Request<Incoming>, url_dest: String) -> Response<Body> {
    let query = query_map(req.uri());
    let dest = query
        .get("dest")
        .cloned()
        .filter(|d| !d.is_empty())
        .unwrap_or(url_dest);
    let expired_time = query
        .get("expiredTime")
        .cloned()
        .unwrap_or_else(|| DEFAULT_EXPIRED_TIME.to_string());
    let policy = match query.get("replaceIfExist") {
        Some(v) if !truthy(v) => OverwritePolicy::Keep,
        _ => OverwritePolicy::Replace,
    };
    let encoding = if header_contains(&req, CONTENT_ENCODING, "gzip") {
        ContentEncoding::Gzip
    } else {
        ContentEncoding::Identity
    };
    debug!(dest = %dest, expired_time = %expired_time, ?encoding, "upload");

    let host = request_host(&req);
    let reader = body_reader(req.into_body());
    match depot
        .ingest(&dest, reader, encoding, &expired_time, policy)
        .await
    {
        Ok(outcome) => {
            let download_path = format!("http://{host}/r/download{dest}");
            let (msg, record) = match &outcome {
                IngestOutcome::Stored(record) => (ErrCode::Ok.message().to_string(), record),
                IngestOutcome::AlreadyExists(record) => ("file exist".to_string(), record),
            };
            responses::json_response(
                StatusCode::OK,
                &UploadResponse {
                    status: ErrCode::Ok.code(),
                    msg,
                    file: FileInfoJson::new(record, Some(download_path)),
                },
            )
        }
        Err(e) => responses::error_envelope(&e),
    }
}

pub async fn download(depot: &Depot, req: &Request<Incoming>, path: &str) -> Response<Body> {
    let accepts_gzip = header_contains(req, ACCEPT_ENCODING, "gzip");
    let file = match depot.retrieve(path, accepts_gzip).await {
        Ok(file) => file,
        Err(e @ DepotError::NotFoundOnDisk(_)) => {
            return responses::plain_error(StatusCode::NOT_FOUND, &e.to_string())
        }
        Err(e) => {
            return responses::plain_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Unable to open and read file : {e}"),
            )
        }
    };

    if not_modified_since(req, file.modified) {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .body(responses::full_body(Vec::new()))
            .unwrap();
    }

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(LAST_MODIFIED, http_date(file.modified));
    if file.compressed {
        builder = builder.header(CONTENT_ENCODING, "gzip");
    } else {
        builder = builder.header(CONTENT_LENGTH, file.plain_size);
    }
    builder.body(responses::stream_body(file.reader)).unwrap()
}

pub async fn info(depot: &Depot, req: &Request<Incoming>, path: &str) -> Response<Body> {
    let query = query_map(req.uri());
    let is_dir = query.get("isDir").map(|v| !falsy(v)).unwrap_or(false);

    if is_dir {
        let recursive = query.get("recursion").map(|v| truthy(v)).unwrap_or(true);
        let suffix = query.get("suffix").cloned().unwrap_or_default();
        let dir = if path.is_empty() { "/" } else { path };
        return match depot.list(dir, &suffix, recursive).await {
            Ok(files) => responses::json_response(
                StatusCode::OK,
                &InfoResponse {
                    status: ErrCode::Ok.code(),
                    msg: ErrCode::Ok.message().to_string(),
                    file: None,
                    all_file: Some(files),
                },
            ),
            Err(e) => responses::error_envelope(&e),
        };
    }

    match depot.info(path).await {
        Ok(record) => {
            let download_path = format!("http://{}/r/download{}", request_host(req), path);
            responses::json_response(
                StatusCode::OK,
                &InfoResponse {
                    status: ErrCode::Ok.code(),
                    msg: ErrCode::Ok.message().to_string(),
                    file: Some(FileInfoJson::new(&record, Some(download_path))),
                    all_file: None,
                },
            )
        }
        Err(e) => responses::error_envelope(&e),
    }
}

pub async fn clean(depot: &Depot) -> Response<Body> {
    match depot.reap().await {
        Ok(report) => {
            let deleted_files = report
                .into_reclaimed()
                .into_iter()
                .map(|(path, record)| (path, FileInfoJson::new(&record, None)))
                .collect::<std::collections::BTreeMap<_, _>>();
            responses::json_response(
                StatusCode::OK,
                &CleanResponse {
                    status: ErrCode::Ok.code(),
                    msg: ErrCode::Ok.message().to_string(),
                    num_deleted_files: deleted_files.len(),
                    deleted_files,
                },
            )
        }
        Err(e) => responses::error_envelope(&e),
    }
}

pub fn backup(depot: &Depot) -> Response<Body> {
    match depot.backup() {
        Ok(blob) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_DISPOSITION, "attachment; filename=\"depot-meta.bak\"")
            .header(CONTENT_LENGTH, blob.len())
            .body(responses::full_body(blob))
            .unwrap(),
        Err(e) => responses::plain_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

pub fn status(depot: &Depot, listen_addr: &str) -> Response<Body> {
    responses::json_response(
        StatusCode::OK,
        &StatusResponse {
            status: ErrCode::Ok.code(),
            msg: ErrCode::Ok.message().to_string(),
            id: listen_addr.to_string(),
            file_number: depot.file_count(),
        },
    )
}

/// Request body as an async byte reader.
fn body_reader(body: Incoming) -> impl AsyncRead + Send + Unpin + 'static {
    BodyStream::new(body)
        .map(|frame| match frame {
            Ok(frame) => Ok(frame.into_data().unwrap_or_default()),
            Err(e) => Err(io::Error::other(e)),
        })
        .into_async_read()
}

fn query_map(uri: &Uri) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(query) = uri.query() else {
        return map;
    };
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map(|s| s.into_owned()).unwrap_or_default();
        let value = urlencoding::decode(value)
            .map(|s| s.into_owned())
            .unwrap_or_default();
        if !key.is_empty() {
            map.insert(key, value);
        }
    }
    map
}

fn truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn falsy(value: &str) -> bool {
    value.eq_ignore_ascii_case("false") || value == "0"
}

fn header_contains<B>(req: &Request<B>, name: hyper::header::HeaderName, token: &str) -> bool {
    req.headers()
        .get_all(name)
        .iter()
        .any(|v| v.to_str().map(|s| s.contains(token)).unwrap_or(false))
}

fn request_host<B>(req: &Request<B>) -> String {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn not_modified_since<B>(req: &Request<B>, modified: SystemTime) -> bool {
    let Some(since) = req
        .headers()
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
    else {
        return false;
    };
    // HTTP dates carry second precision
    DateTime::<Utc>::from(modified).timestamp() <= since.timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_map_decodes_pairs() {
        let uri: Uri = "/r/upload/x?dest=%2Fa%2Fb.log&expiredTime=2h&replaceIfExist=false"
            .parse()
            .unwrap();
        let query = query_map(&uri);
        assert_eq!(query.get("dest").unwrap(), "/a/b.log");
        assert_eq!(query.get("expiredTime").unwrap(), "2h");
        assert_eq!(query.get("replaceIfExist").unwrap(), "false");
        assert!(query.get("missing").is_none());
    }

    #[test]
    fn boolish_flags_follow_legacy_rules() {
        for value in ["true", "TRUE", "True", "1"] {
            assert!(truthy(value), "{value}");
        }
        for value in ["false", "0", "yes", ""] {
            assert!(!truthy(value), "{value}");
        }
        for value in ["false", "FALSE", "0"] {
            assert!(falsy(value), "{value}");
        }
        // anything that is not explicitly false counts as set
        assert!(!falsy("yes"));
    }

    #[test]
    fn http_dates_round_trip() {
        let now = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let formatted = http_date(now);
        let parsed = DateTime::parse_from_rfc2822(&formatted).unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
    }
}
