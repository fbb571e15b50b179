fn main() {
    // Records crate version and git state for `mosys --version`
    built::write_built_file().expect("Failed to acquire build-time information");
}
