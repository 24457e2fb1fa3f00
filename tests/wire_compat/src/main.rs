fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use nimbus_protocol::constants::{chunk_fields, finalize_fields};
    use nimbus_protocol::{ErrorBody, FileRecord};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file captured from the drive backend.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture and re-serializes it, asserting nothing is lost.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  Go:   {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_finalize_success() {
        let record: FileRecord = roundtrip_test("finalize_success.json");
        assert_eq!(record.file_name, "holiday_3.jpg");
        assert_eq!(record.access_path, "/i/holiday_3.jpg");
    }

    #[test]
    fn fixture_missing_chunks() {
        let body: ErrorBody = roundtrip_test("missing_chunks.json");
        assert_eq!(body.missing_chunks, vec![1, 4]);
        assert_eq!(body.message.as_deref(), Some("Some chunks are missing"));
    }

    #[test]
    fn multipart_field_names() {
        assert_eq!(chunk_fields::CHUNK, "chunk");
        assert_eq!(chunk_fields::CHUNK_INDEX, "chunkIndex");
        assert_eq!(finalize_fields::TOTAL_CHUNKS, "totalChunks");
        assert_eq!(finalize_fields::ORIGINAL_FILE_NAME, "originalFileName");
        assert_eq!(finalize_fields::COLLECTION_ID, "collectionId");
        assert_eq!(finalize_fields::TOKEN, "token");
        assert_eq!(finalize_fields::EMAIL, "email");
        assert_eq!(finalize_fields::PASSWORD, "password");
    }
}
