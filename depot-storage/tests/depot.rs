use std::time::Duration;

use async_compression::futures::bufread::{GzipDecoder, GzipEncoder};
use futures::io::{AsyncReadExt, BufReader, Cursor};

use depot_storage::{
    ContentEncoding, Depot, DepotError, Durability, IngestOutcome, OverwritePolicy,
};

fn new_depot(dir: &tempfile::TempDir) -> Depot {
    Depot::open(
        dir.path().join("data"),
        dir.path().join("meta"),
        Durability::Buffer,
    )
    .unwrap()
}

async fn put(depot: &Depot, path: &str, bytes: &[u8], expiry: &str) -> IngestOutcome {
    depot
        .ingest(
            path,
            Cursor::new(bytes.to_vec()),
            ContentEncoding::Identity,
            expiry,
            OverwritePolicy::Replace,
        )
        .await
        .unwrap()
}

async fn read_back(depot: &Depot, path: &str) -> Vec<u8> {
    let mut file = depot.retrieve(path, false).await.unwrap();
    let mut out = Vec::new();
    file.reader.read_to_end(&mut out).await.unwrap();
    out
}

async fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzipEncoder::new(BufReader::new(Cursor::new(bytes.to_vec())));
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await.unwrap();
    out
}

async fn gunzip(bytes: &[u8]) -> Vec<u8> {
    let mut decoder = GzipDecoder::new(BufReader::new(Cursor::new(bytes.to_vec())));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn round_trip_returns_identical_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    let outcome = put(&depot, "/x.log", b"hello", "1h").await;
    assert!(outcome.is_stored());
    assert_eq!(
        outcome.record().hash_hex(),
        "5d41402abc4b2a76b9719d911017c592"
    );

    let body = read_back(&depot, "/x.log").await;
    assert_eq!(body, b"hello");
    assert_eq!(depot.file_count(), 1);
}

#[tokio::test]
async fn compressed_transport_is_transparent() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);
    put(&depot, "/x.log", b"hello", "1h").await;

    let mut file = depot.retrieve("/x.log", true).await.unwrap();
    assert!(file.compressed);
    assert_eq!(file.plain_size, 5);

    let mut wire = Vec::new();
    file.reader.read_to_end(&mut wire).await.unwrap();
    assert_eq!(gunzip(&wire).await, b"hello");
}

#[tokio::test]
async fn gzip_upload_is_stored_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    let plaintext = b"hello world, many times over".repeat(100);
    let compressed = gzip(&plaintext).await;
    let outcome = depot
        .ingest(
            "/big.log",
            Cursor::new(compressed),
            ContentEncoding::Gzip,
            "1h",
            OverwritePolicy::Replace,
        )
        .await
        .unwrap();

    let expected_hash: [u8; 16] = {
        use md5::Digest;
        md5::Md5::digest(&plaintext).into()
    };
    assert_eq!(outcome.record().content_hash(), &expected_hash);
    assert_eq!(read_back(&depot, "/big.log").await, plaintext);
}

#[tokio::test]
async fn malformed_gzip_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    let err = depot
        .ingest(
            "/bad.log",
            Cursor::new(b"this is not gzip".to_vec()),
            ContentEncoding::Gzip,
            "1h",
            OverwritePolicy::Replace,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::UpstreamDecode(_)));

    // nothing committed, nothing published, nothing counted
    assert!(matches!(
        depot.info("/bad.log").await.unwrap_err(),
        DepotError::NotFoundInMetadata(_)
    ));
    assert!(matches!(
        depot.retrieve("/bad.log", false).await.unwrap_err(),
        DepotError::NotFoundOnDisk(_)
    ));
    assert_eq!(depot.file_count(), 0);
    assert!(depot.list("/", "", true).await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_length_upload_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    let outcome = put(&depot, "/empty.bin", b"", "1h").await;
    assert_eq!(
        outcome.record().hash_hex(),
        "d41d8cd98f00b204e9800998ecf8427e"
    );
    assert!(read_back(&depot, "/empty.bin").await.is_empty());
}

#[tokio::test]
async fn overwrite_denied_keeps_first_record() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    let first = put(&depot, "/x.log", b"original", "1h").await;

    let second = depot
        .ingest(
            "/x.log",
            Cursor::new(b"replacement".to_vec()),
            ContentEncoding::Identity,
            "1h",
            OverwritePolicy::Keep,
        )
        .await
        .unwrap();

    match second {
        IngestOutcome::AlreadyExists(record) => assert_eq!(&record, first.record()),
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
    assert_eq!(read_back(&depot, "/x.log").await, b"original");
    assert_eq!(depot.file_count(), 1);
}

#[tokio::test]
async fn overwrite_allowed_replaces_record_and_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    let first = put(&depot, "/x.log", b"one", "1h").await;
    let second = put(&depot, "/x.log", b"two", "1h").await;

    assert!(second.is_stored());
    assert_ne!(first.record().content_hash(), second.record().content_hash());
    assert_eq!(read_back(&depot, "/x.log").await, b"two");
    // replacement does not double count
    assert_eq!(depot.file_count(), 1);
}

#[tokio::test]
async fn reap_reclaims_expired_file_and_prunes_directories() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    put(&depot, "/a/b/c.log", b"doomed", "1ms").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = depot.reap().await.unwrap();
    assert_eq!(report.count(), 1);
    assert!(report.reclaimed().contains_key("/a/b/c.log"));

    assert!(matches!(
        depot.retrieve("/a/b/c.log", false).await.unwrap_err(),
        DepotError::NotFoundOnDisk(_)
    ));
    assert!(!depot.disk().root().join("a/b").exists());
    assert!(!depot.disk().root().join("a").exists());
    assert!(depot.disk().root().exists());
    assert_eq!(depot.file_count(), 0);
}

#[tokio::test]
async fn reap_leaves_unexpired_files_and_their_directories() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    put(&depot, "/a/keep.log", b"keep", "1h").await;
    put(&depot, "/a/b/del.log", b"del", "1ms").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = depot.reap().await.unwrap();
    assert_eq!(report.count(), 1);
    assert!(report.reclaimed().contains_key("/a/b/del.log"));

    // /a/b emptied out, /a still holds keep.log
    assert!(!depot.disk().root().join("a/b").exists());
    assert_eq!(read_back(&depot, "/a/keep.log").await, b"keep");
    assert_eq!(depot.file_count(), 1);

    // a second sweep finds nothing
    assert_eq!(depot.reap().await.unwrap().count(), 0);
    assert_eq!(depot.file_count(), 1);
}

#[tokio::test]
async fn listing_filters_by_suffix_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    put(&depot, "/logs/a.log", b"1", "1h").await;
    put(&depot, "/logs/b.LOG", b"2", "1h").await;
    put(&depot, "/logs/c.txt", b"3", "1h").await;
    put(&depot, "/logs/sub/d.log", b"4", "1h").await;

    assert_eq!(
        depot.list("/logs", ".log", false).await.unwrap(),
        vec!["/logs/a.log", "/logs/b.LOG"]
    );
    assert_eq!(
        depot.list("/logs", ".log", true).await.unwrap(),
        vec!["/logs/a.log", "/logs/b.LOG", "/logs/sub/d.log"]
    );
    assert_eq!(depot.list("/", "", true).await.unwrap().len(), 4);
}

#[tokio::test]
async fn info_reports_absences_and_reclaims_expired_records() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    assert!(matches!(
        depot.info("/missing.log").await.unwrap_err(),
        DepotError::NotFoundInMetadata(_)
    ));

    let stored = put(&depot, "/x.log", b"hello", "1h").await;
    assert_eq!(&depot.info("/x.log").await.unwrap(), stored.record());

    // record exists but the backing file vanished externally
    std::fs::remove_file(depot.disk().root().join("x.log")).unwrap();
    assert!(matches!(
        depot.info("/x.log").await.unwrap_err(),
        DepotError::NotFoundOnDisk(_)
    ));

    // an expired record is reclaimed by the lookup itself
    put(&depot, "/a/short.log", b"gone soon", "1ms").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(matches!(
        depot.info("/a/short.log").await.unwrap_err(),
        DepotError::NotFoundOnDisk(_)
    ));
    assert!(matches!(
        depot.info("/a/short.log").await.unwrap_err(),
        DepotError::NotFoundInMetadata(_)
    ));
    assert!(!depot.disk().root().join("a").exists());
}

#[tokio::test]
async fn rejects_invalid_paths_and_expiries() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    for path in ["", "x.log", "/", "/dir/", "/a/../b"] {
        let err = depot
            .ingest(
                path,
                Cursor::new(Vec::new()),
                ContentEncoding::Identity,
                "1h",
                OverwritePolicy::Replace,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DepotError::InvalidPath(_)), "path {path:?}");
    }

    for expiry in ["", "soon", "-1h", "0s"] {
        let err = depot
            .ingest(
                "/x.log",
                Cursor::new(Vec::new()),
                ContentEncoding::Identity,
                expiry,
                OverwritePolicy::Replace,
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, DepotError::InvalidExpiry(_)),
            "expiry {expiry:?}"
        );
    }
}

#[tokio::test]
async fn ingesting_onto_a_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    put(&depot, "/a/b.log", b"x", "1h").await;
    let err = depot
        .ingest(
            "/a",
            Cursor::new(Vec::new()),
            ContentEncoding::Identity,
            "1h",
            OverwritePolicy::Replace,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::PathIsDirectory(_)));
}

#[tokio::test]
async fn backup_captures_current_records() {
    let dir = tempfile::tempdir().unwrap();
    let depot = new_depot(&dir);

    let empty = depot.backup().unwrap();
    put(&depot, "/x.log", b"hello", "1h").await;
    let one = depot.backup().unwrap();
    assert!(one.len() > empty.len());
}

#[tokio::test]
async fn live_count_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let depot = new_depot(&dir);
        put(&depot, "/a.log", b"1", "1h").await;
        put(&depot, "/b.log", b"2", "1h").await;
        assert_eq!(depot.file_count(), 2);
    }
    let depot = new_depot(&dir);
    assert_eq!(depot.file_count(), 2);
}
