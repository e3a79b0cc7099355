// Build script: compile the triangle's GLSL shaders to SPIR-V with glslc.
// A missing glslc is only a warning; the renderer core builds without shaders.

use std::path::Path;
use std::process::Command;

const SHADERS: &[&str] = &["shaders/triangle.vert", "shaders/triangle.frag"];

fn main() {
    for source in SHADERS {
        println!("cargo:rerun-if-changed={}", source);

        let output = format!("{}.spv", source);
        compile_shader(Path::new(source), Path::new(&output));
    }
}

fn compile_shader(input: &Path, output: &Path) {
    match Command::new("glslc").arg(input).arg("-o").arg(output).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("glslc failed on {}: exit code {:?}", input.display(), status.code());
        }
        Err(e) => {
            println!(
                "cargo:warning=glslc unavailable ({}), {} not compiled",
                e,
                input.display()
            );
        }
    }
}
