//! End-to-end builds over in-memory stores and on-disk inputs.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::fs;

use h4_dmrpp_core::{
    BuildError, BuildOptions, TrailingChunks, build, build_with_store,
    catalog::{ByteOrder, ChunkLayout},
    document::{Document, RenderOptions},
    schema::{ArrayVariable, Group, Variable},
    store::{
        BlockLocation, DatasetDescription,
        memory::{MemoryDataset, MemoryStore},
    },
    walk::SkipReason,
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn chunked_4x4() -> MemoryDataset {
    MemoryDataset::new(DatasetDescription::compressed(
        [4, 4],
        [2, 2],
        "deflate",
        "bigEndian",
    ))
    .with_blocks(Some(vec![0, 0]), vec![BlockLocation::new(1000, 10)])
    .with_blocks(Some(vec![0, 1]), vec![BlockLocation::new(1010, 11)])
    .with_blocks(Some(vec![1, 0]), vec![BlockLocation::new(1021, 12)])
    .with_blocks(Some(vec![1, 1]), vec![BlockLocation::new(1033, 13)])
}

fn schema() -> Group {
    Group::root()
        .with_variable(Variable::array("temp", ArrayVariable::new("Float32", [4, 4])))
        .with_variable(Variable::sequence(
            "obs",
            vec![Variable::atomic("station", "String")],
        ))
        .with_group(
            Group::new("geo")
                .with_variable(Variable::array("lat", ArrayVariable::new("Float32", [3]))),
        )
}

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_dataset("temp", chunked_4x4())
        .with_dataset(
            "lat",
            MemoryDataset::new(DatasetDescription::contiguous([3], "littleEndian")).with_blocks(
                None,
                vec![BlockLocation::new(200, 8), BlockLocation::new(300, 4)],
            ),
        )
}

#[test]
fn chunked_array_and_sequence_in_one_tree() -> TestResult {
    let built = build_with_store(schema(), store(), &BuildOptions::default())?;

    let temp = built.schema.find_array("/temp").unwrap();
    let chunks = temp.chunks.as_ref().unwrap();
    assert_eq!(
        chunks.layout,
        ChunkLayout::ChunkedCompressed {
            chunk_dims: vec![2, 2],
            codec: "deflate".to_string()
        }
    );
    let positions: Vec<Vec<u64>> = chunks.catalog.iter().map(|d| d.position.clone()).collect();
    assert_eq!(
        positions,
        vec![vec![0, 0], vec![0, 2], vec![2, 0], vec![2, 2]]
    );
    assert!(chunks.catalog.iter().all(|d| d.byte_order == ByteOrder::Big));

    assert_eq!(
        built.report.skip_for("/obs"),
        Some(&SkipReason::UnsupportedKind {
            kind: h4_dmrpp_core::schema::NodeKind::Sequence
        })
    );
    assert_eq!(built.report.cataloged, vec!["/temp", "/geo/lat"]);
    Ok(())
}

#[test]
fn contiguous_blocks_all_sit_at_the_origin() -> TestResult {
    let built = build_with_store(schema(), store(), &BuildOptions::default())?;
    let lat = built.schema.find_array("/geo/lat").unwrap();
    let chunks = lat.chunks.as_ref().unwrap();

    assert_eq!(chunks.layout, ChunkLayout::Contiguous);
    assert_eq!(chunks.catalog.len(), 2);
    assert!(chunks.catalog.iter().all(|d| d.position == vec![0]));
    assert_eq!(
        chunks.catalog.iter().map(|d| d.offset).collect::<Vec<_>>(),
        vec![200, 300]
    );
    Ok(())
}

#[test]
fn grid_variable_aborts_with_no_partial_output() {
    let tree = schema().with_variable(Variable::grid("g", vec![]));
    let err = build_with_store(tree, store(), &BuildOptions::default()).unwrap_err();
    assert!(matches!(err, BuildError::UnsupportedVariableKind { .. }));
    assert!(err.to_string().contains("/g"));
}

#[test]
fn repeated_builds_render_identical_documents() -> TestResult {
    let render = || -> Result<String, Box<dyn std::error::Error>> {
        let built = build_with_store(schema(), store(), &BuildOptions::default())?;
        let doc = Document::new(
            built.schema,
            RenderOptions {
                href: "data.hdf".to_string(),
                build_metadata: None,
            },
        );
        Ok(doc.to_json()?)
    };
    assert_eq!(render()?, render()?);
    Ok(())
}

#[test]
fn trailing_chunks_follow_the_option() -> TestResult {
    let dataset = MemoryDataset::new(DatasetDescription::chunked([5, 3], [2, 2], "bigEndian"));
    let dataset = (0..3u64)
        .flat_map(|i| (0..2u64).map(move |j| (i, j)))
        .fold(dataset, |ds, (i, j)| {
            ds.with_blocks(
                Some(vec![i, j]),
                vec![BlockLocation::new(100 * i + 10 * j, 16)],
            )
        });
    let store = MemoryStore::new().with_dataset("t", dataset);
    let tree =
        Group::root().with_variable(Variable::array("t", ArrayVariable::new("Int32", [5, 3])));

    let count = |options: BuildOptions| -> Result<usize, BuildError> {
        let built = build_with_store(tree.clone(), &store, &options)?;
        Ok(built
            .schema
            .find_array("/t")
            .and_then(|a| a.chunks.as_ref())
            .map_or(0, |c| c.catalog.len()))
    };

    assert_eq!(count(BuildOptions::default())?, 6);
    assert_eq!(
        count(BuildOptions::default().with_trailing_chunks(TrailingChunks::Truncate))?,
        2
    );
    Ok(())
}

#[test]
fn wrong_signature_is_rejected_before_traversal() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("data.h5");
    fs::write(&path, b"\x89HDF\r\n\x1a\n")?;

    let err = build(schema(), &path, &BuildOptions::default()).unwrap_err();
    assert!(err.is_wrong_format());
    assert!(err.to_string().contains("not an HDF4 file"));
    Ok(())
}
