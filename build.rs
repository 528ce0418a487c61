fn main() {
    println!("cargo:rerun-if-env-changed=REPCLIP_CONFIG_JSON");

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
