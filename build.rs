fn main() {
    // The ESP-IDF environment is only needed for the firmware (Xtensa) target.
    // Host builds (tests, host-node) skip it.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") {
            embuild::espidf::sysenv::output();
        }
    }
}
