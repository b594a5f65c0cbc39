#[cfg(feature = "gen-bindings")]
mod bindgen;

#[cfg(feature = "gen-bindings")]
fn main() {
    bindgen::generate(uniffi::KotlinBindingGenerator, "Kotlin");
}

#[cfg(not(feature = "gen-bindings"))]
fn main() {}
