#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::{fs, io};

use h4_dmrpp_core::hdf4::{
    tags::{COMP_CODE_DEFLATE, DFNTF_IEEE},
    test_util::{H4Builder, SdsData, SdsLayout},
};
use serde_json::{Value, json};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_build-dmrpp-h4")
}

fn run_cli(args: &[&str]) -> io::Result<Output> {
    Command::new(cli_bin()).args(args).output()
}

fn assert_cli_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

struct Fixture {
    _tmp: TempDir,
    data: PathBuf,
    schema: PathBuf,
    builder: H4Builder,
    temp: SdsLayout,
}

/// A file with a chunked, deflated 5x4 array (chunks 2x2, trailing row
/// partial) and a contiguous 1-D array, plus a schema naming both and a
/// sequence.
fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
    let tmp = TempDir::new()?;

    let mut builder = H4Builder::new();
    let chunks = (0..3u64)
        .flat_map(|i| (0..2u64).map(move |j| (vec![i, j], vec![(i * 2 + j) as u8; 7])))
        .collect();
    let temp = builder.sds(
        "temp",
        &[5, 4],
        DFNTF_IEEE,
        SdsData::Chunked {
            chunk_dims: vec![2, 2],
            coder: Some(COMP_CODE_DEFLATE),
            chunks,
        },
    );
    builder.sds("lat", &[5], DFNTF_IEEE, SdsData::Contiguous(vec![0; 20]));

    let data = tmp.path().join("granule.hdf");
    builder.write(&data)?;

    let schema = tmp.path().join("schema.json");
    let doc = json!({
        "name": "/",
        "variables": [
            {"name": "temp", "kind": "array", "type": "Float32",
             "dims": [{"name": "row", "size": 5}, {"name": "col", "size": 4}]},
            {"name": "obs", "kind": "sequence", "members": []}
        ],
        "groups": [
            {"name": "geo", "variables": [
                {"name": "lat", "kind": "array", "type": "Float32", "dims": [{"size": 5}]}
            ], "groups": []}
        ]
    });
    fs::write(&schema, serde_json::to_vec_pretty(&doc)?)?;

    Ok(Fixture {
        _tmp: tmp,
        data,
        schema,
        builder,
        temp,
    })
}

#[test]
fn prints_annotated_document_to_stdout() -> TestResult {
    let fx = fixture()?;
    let out = run_cli(&["-f", path_str(&fx.data), "-r", path_str(&fx.schema)])?;
    assert_cli_success(&out);

    let doc: Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(doc["href"], path_str(&fx.data));
    assert!(doc.get("build_metadata").is_none());

    let temp = &doc["root"]["variables"][0];
    assert_eq!(temp["chunks"]["layout"], "chunked_compressed");
    assert_eq!(temp["chunks"]["codec"], "deflate");
    assert_eq!(temp["chunks"]["chunk_dims"], json!([2, 2]));

    let catalog = temp["chunks"]["catalog"].as_array().unwrap();
    assert_eq!(catalog.len(), 6);
    let first = fx.builder.block(fx.temp.data[0]).unwrap();
    assert_eq!(catalog[0]["offset"], first.offset);
    assert_eq!(catalog[0]["length"], 7);
    assert_eq!(catalog[5]["position"], json!([4, 2]));

    assert!(doc["root"]["variables"][1].get("chunks").is_none());

    let lat = &doc["root"]["groups"][0]["variables"][0];
    assert_eq!(lat["chunks"]["layout"], "contiguous");
    assert_eq!(lat["chunks"]["catalog"][0]["position"], json!([0]));
    Ok(())
}

#[test]
fn output_file_href_and_production_metadata() -> TestResult {
    let fx = fixture()?;
    let out_path = fx.data.with_extension("dmrpp.json");

    let out = run_cli(&[
        "-f",
        path_str(&fx.data),
        "-r",
        path_str(&fx.schema),
        "-u",
        "https://example.org/granule.hdf",
        "-o",
        path_str(&out_path),
        "--production-metadata",
    ])?;
    assert_cli_success(&out);
    assert!(out.stdout.is_empty());

    let doc: Value = serde_json::from_str(&fs::read_to_string(&out_path)?)?;
    assert_eq!(doc["href"], "https://example.org/granule.hdf");
    assert_eq!(doc["build_metadata"]["tool"], "build-dmrpp-h4");
    assert!(
        doc["build_metadata"]["invocation"]
            .as_str()
            .unwrap()
            .contains("--production-metadata")
    );
    Ok(())
}

#[test]
fn truncate_flag_drops_partial_trailing_chunks() -> TestResult {
    let fx = fixture()?;
    let out = run_cli(&[
        "-f",
        path_str(&fx.data),
        "-r",
        path_str(&fx.schema),
        "--truncate-partial-chunks",
    ])?;
    assert_cli_success(&out);

    let doc: Value = serde_json::from_slice(&out.stdout)?;
    let catalog = doc["root"]["variables"][0]["chunks"]["catalog"]
        .as_array()
        .unwrap();
    assert_eq!(catalog.len(), 4);
    Ok(())
}

#[test]
fn wrong_signature_fails_without_output() -> TestResult {
    let fx = fixture()?;
    let bogus = fx.data.with_file_name("granule.h5");
    fs::write(&bogus, b"\x89HDF\r\n\x1a\n\0\0\0\0")?;

    let out = run_cli(&["-f", path_str(&bogus), "-r", path_str(&fx.schema)])?;
    assert!(!out.status.success());
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("is not an HDF4 file"));
    Ok(())
}

#[test]
fn missing_input_reports_where_to_look() -> TestResult {
    let fx = fixture()?;
    let absent = fx.data.with_file_name("absent.hdf");

    let out = run_cli(&["-f", path_str(&absent), "-r", path_str(&fx.schema)])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Cannot read"), "stderr: {stderr}");
    assert!(stderr.contains("expected location"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn grid_in_schema_aborts() -> TestResult {
    let fx = fixture()?;
    let schema = fx.schema.with_file_name("grid.json");
    fs::write(
        &schema,
        serde_json::to_vec(&json!({
            "name": "/",
            "variables": [{"name": "g", "kind": "grid", "members": []}],
            "groups": []
        }))?,
    )?;

    let out = run_cli(&["-f", path_str(&fx.data), "-r", path_str(&schema)])?;
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("grid variables are not supported"));
    Ok(())
}

#[test]
fn invalid_schema_document_is_reported() -> TestResult {
    let fx = fixture()?;
    let schema = fx.schema.with_file_name("broken.json");
    fs::write(&schema, "{ not json")?;

    let out = run_cli(&["-f", path_str(&fx.data), "-r", path_str(&schema)])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("is not valid"));
    Ok(())
}

#[test]
fn input_flag_is_required() -> TestResult {
    let out = run_cli(&["-r", "schema.json"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--input"));
    Ok(())
}
