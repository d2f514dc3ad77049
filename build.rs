//! Build script for podfw
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! shown by `podfw --version`.

fn main() {
    // Re-run build if the default topology location is overridden by packagers
    println!("cargo:rerun-if-env-changed=PODFW_DEFAULT_TOPOLOGY");

    // Embed git commit, build time, and dirty status
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
