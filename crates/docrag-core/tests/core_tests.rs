use std::fs;
use tempfile::TempDir;

use docrag_core::error::Error;
use docrag_core::ingest::{decode_with_fallback, Ingestor, SkipReason, TextEncoding};

fn ingestor() -> Ingestor {
    Ingestor::new(vec![".md".to_string(), ".txt".to_string()])
}

#[test]
fn reads_matching_files_with_metadata() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "  Short text\n\n").unwrap();
    fs::write(dir.join("b.md"), "# Title\nbody").unwrap();
    fs::write(dir.join("c.rs"), "fn main() {}").unwrap();

    let docs = ingestor().read_documents(dir).expect("read");

    assert_eq!(docs.len(), 2, "only .md and .txt files are read");
    assert_eq!(docs[0].source_name, "a.txt");
    assert_eq!(docs[0].content, "Short text", "content is trimmed");
    assert_eq!(docs[0].extension, ".txt");
    assert_eq!(docs[0].encoding, "utf-8");
    assert!(docs[0].source_path.ends_with("a.txt"));
    assert_eq!(docs[1].source_name, "b.md");
    assert_eq!(docs[1].extension, ".md");
}

#[test]
fn overlapping_patterns_read_each_file_once() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("notes.old.txt"), "archived notes").unwrap();

    let ingestor = Ingestor::new(vec![".txt".to_string(), ".old.txt".to_string()]);
    let docs = ingestor.read_documents(tmp.path()).expect("read");

    assert_eq!(docs.len(), 1);
}

#[test]
fn empty_files_are_skipped_not_fatal() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("blank.txt"), " \n\t \n").unwrap();
    fs::write(tmp.path().join("real.txt"), "real content").unwrap();

    let report = ingestor().ingest(tmp.path()).expect("ingest");

    assert_eq!(report.documents.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::Empty);
    assert!(report.skipped[0].path.ends_with("blank.txt"));
}

#[test]
fn no_eligible_files_is_an_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("image.png"), [0u8, 1, 2]).unwrap();
    fs::write(tmp.path().join("blank.md"), "   ").unwrap();

    let err = ingestor().read_documents(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::NoDocumentsFound { .. }), "got {err:?}");
}

#[test]
fn subdirectories_are_only_read_when_recursive() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("top.txt"), "top level").unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    fs::write(tmp.path().join("nested").join("deep.txt"), "nested level").unwrap();

    let flat = ingestor().read_documents(tmp.path()).expect("flat");
    assert_eq!(flat.len(), 1);

    let deep = ingestor().recursive(true).read_documents(tmp.path()).expect("recursive");
    assert_eq!(deep.len(), 2);
}

#[test]
fn legacy_korean_files_fall_back_to_cp949() {
    // "안녕하세요" in EUC-KR / CP949
    let bytes = [0xBE, 0xC8, 0xB3, 0xE7, 0xC7, 0xCF, 0xBC, 0xBC, 0xBF, 0xE4];
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("greeting.txt"), bytes).unwrap();

    let docs = ingestor().read_documents(tmp.path()).expect("read");
    assert_eq!(docs[0].content, "안녕하세요");
    assert_eq!(docs[0].encoding, "cp949");
}

#[test]
fn decode_fallback_order() {
    let (text, enc) = decode_with_fallback("héllo".as_bytes()).unwrap();
    assert_eq!((text.as_str(), enc), ("héllo", TextEncoding::Utf8));

    let (text, enc) = decode_with_fallback(b"\xEF\xBB\xBFbom").unwrap();
    assert_eq!((text.as_str(), enc), ("bom", TextEncoding::Utf8));

    // 0x80 is invalid UTF-8 and not a CP949 lead byte
    let (text, enc) = decode_with_fallback(b"caf\x80").unwrap();
    assert_eq!(enc, TextEncoding::Latin1);
    assert_eq!(text, "caf\u{80}");
}

#[test]
fn strict_euc_kr_rejects_cp949_extensions() {
    // 0x81 0x41 is a CP949 extension ("갂"), outside KS X 1001.
    assert!(TextEncoding::EucKr.decode(&[0x81, 0x41]).is_none());
    assert_eq!(TextEncoding::Cp949.decode(&[0x81, 0x41]).as_deref(), Some("갂"));
}
