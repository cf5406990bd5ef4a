use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pagewise_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pagewise");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::write(
        root.join("contract.txt"),
        "# Service Agreement\nThe provider delivers maintenance every quarter.\n\x0C\
         # Payment\nThe total amount is 9.800,96€ payable within 30 days.\n",
    )
    .unwrap();

    let config_path = root.join("pagewise.toml");
    fs::write(
        &config_path,
        r#"[splitter]
tokenizer = "estimate"

[ingest]
mode = "pages"
"#,
    )
    .unwrap();

    (tmp, config_path)
}

/// Minimal structurally valid PDF with one page of Helvetica text.
/// pdf-extract may or may not recover the text from it; only the exit status is asserted.
fn minimal_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let objects: [&[u8]; 5] = [
        b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n",
        b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n",
        b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n",
        b"4 0 obj << /Length 43 >> stream\nBT /F1 12 Tf 100 700 Td (rent is due) Tj ET\nendstream endobj\n",
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    ];
    for object in objects {
        offsets.push(out.len());
        out.extend_from_slice(object);
    }
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn run_pagewise(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pagewise_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pagewise binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_split_prints_page_chunks() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("contract.txt");

    let (stdout, stderr, ok) = run_pagewise(&config, &["split", file.to_str().unwrap()]);
    assert!(ok, "split failed: {}", stderr);

    let chunks: Vec<Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["documentId"], "contract");
    assert_eq!(chunks[0]["pageNumber"], 1);
    assert_eq!(chunks[1]["pageNumber"], 2);
    assert!(chunks[1]["content"].as_str().unwrap().contains("9.800,96€"));
    assert_eq!(chunks[0]["chunkId"].as_str().unwrap().len(), 16);
}

#[test]
fn test_split_is_deterministic() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("contract.txt");

    let (first, _, ok1) = run_pagewise(&config, &["split", file.to_str().unwrap(), "--id", "c-1"]);
    let (second, _, ok2) = run_pagewise(&config, &["split", file.to_str().unwrap(), "--id", "c-1"]);
    assert!(ok1 && ok2);
    assert_eq!(first, second);
    assert!(first.contains("\"c-1\""));
}

#[test]
fn test_split_combined_mode() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("contract.txt");

    let (stdout, stderr, ok) = run_pagewise(
        &config,
        &["split", file.to_str().unwrap(), "--mode", "combined"],
    );
    assert!(ok, "split failed: {}", stderr);

    let chunks: Vec<Value> = serde_json::from_str(&stdout).unwrap();
    assert!(!chunks.is_empty());
    let all: String = chunks
        .iter()
        .map(|c| c["content"].as_str().unwrap().to_string())
        .collect();
    assert!(all.contains("maintenance"));
    assert!(all.contains("9.800,96€"));
}

#[test]
fn test_pages_report() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("contract.txt");

    let (stdout, stderr, ok) = run_pagewise(&config, &["pages", file.to_str().unwrap()]);
    assert!(ok, "pages failed: {}", stderr);

    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["metadata"]["totalPages"], 2);
    assert_eq!(report["metadata"]["pagesReturned"], 2);
    assert_eq!(report["pages"][1]["pageIndicator"], "Page 2/2");
    assert_eq!(report["pages"][1]["headings"][0]["text"], "Payment");
    assert!(report["pages"][0]["content"].is_string());

    let (stdout, _, ok) = run_pagewise(
        &config,
        &["pages", file.to_str().unwrap(), "--no-content"],
    );
    assert!(ok);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert!(report["pages"][0].get("content").is_none());
}

#[test]
fn test_corrupt_pdf_fails_cleanly() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("broken.pdf");
    fs::write(&file, b"%PDF-1.4 this is not really a pdf").unwrap();

    let binary = pagewise_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config.to_str().unwrap())
        .args(["split", file.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_ne!(output.status.code(), Some(101), "binary panicked");
}

#[test]
fn test_unsupported_file_type() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("slides.pptx");
    fs::write(&file, b"deck").unwrap();

    let (_, stderr, ok) = run_pagewise(&config, &["pages", file.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("unsupported file type"));
}

#[test]
fn test_ingest_requires_embedding_provider() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("contract.txt");

    let (_, stderr, ok) = run_pagewise(&config, &["ingest", file.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("embedding provider"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[splitter]\nrec_overlap_tokens = 500\nrec_chunk_tokens = 100\n").unwrap();
    let file = tmp.path().join("contract.txt");

    let (_, _, ok) = run_pagewise(&config, &["split", file.to_str().unwrap()]);
    assert!(!ok);

    fs::write(&config, "[splitter]\nsemantic_mode = true\n").unwrap();
    let (_, stderr, ok) = run_pagewise(&config, &["split", file.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("semantic"));
}

#[test]
fn test_minimal_pdf_does_not_crash() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("lease.pdf");
    fs::write(&file, minimal_pdf()).unwrap();

    let binary = pagewise_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config.to_str().unwrap())
        .args(["pages", file.to_str().unwrap()])
        .output()
        .unwrap();
    assert_ne!(output.status.code(), Some(101), "binary panicked");
    if output.status.success() {
        let report: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["metadata"]["documentId"], "lease");
        assert_eq!(report["metadata"]["ocrUsed"], false);
    }
}
