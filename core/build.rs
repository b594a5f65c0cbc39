fn main() {
    uniffi::generate_scaffolding("src/api.udl").expect("failed to generate UniFFI scaffolding");
}
