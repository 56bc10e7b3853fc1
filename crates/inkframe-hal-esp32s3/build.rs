use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=EPDIY_LIB_DIR");

    // epdiy is built by its own CMake project for the ED060XC3 board.
    match env::var("EPDIY_LIB_DIR") {
        Ok(dir) => {
            println!("cargo:rustc-link-search=native={dir}");
            println!("cargo:rustc-link-lib=static=epdiy");
        }
        Err(_) => {
            println!("cargo:warning=EPDIY_LIB_DIR not set, epdiy symbols must come from elsewhere");
        }
    }
}
