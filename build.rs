fn main() {
    // Writes $OUT_DIR/built.rs with package metadata and the git commit hash.
    built::write_built_file().expect("Failed to acquire build-time information");
}
