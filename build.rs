// Build script to compile GLSL shaders to SPIR-V

use std::fs;
use std::path::Path;
use std::process::Command;

const SHADERS: [&str; 2] = ["shaders/mesh.vert", "shaders/mesh.frag"];

fn main() {
    for shader in SHADERS {
        println!("cargo:rerun-if-changed={}", shader);
        let output = format!("{}.spv", shader);
        if is_up_to_date(shader, &output) {
            continue;
        }
        compile_shader(shader, &output);
    }
}

fn is_up_to_date(input: &str, output: &str) -> bool {
    let modified = |path: &str| fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(input), modified(output)) {
        (Some(src), Some(spv)) => spv >= src,
        _ => false,
    }
}

fn compile_shader(input: &str, output: &str) {
    // glslc ships with the Vulkan SDK
    let result = Command::new("glslc")
        .arg(Path::new(input))
        .arg("-o")
        .arg(Path::new(output))
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("glslc rejected {} (exit code {:?})", input, status.code());
        }
        Err(e) => {
            // Prebuilt .spv files still work; the renderer reports missing ones at startup
            println!("cargo:warning=glslc unavailable ({}), {} not compiled", e, input);
            println!("cargo:warning=compile manually: glslc {} -o {}", input, output);
        }
    }
}
