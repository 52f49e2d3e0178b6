use super::{Compiler, RunProfile};

/// OpenJDK `javac`; the class must be called `Main`
pub struct Java;

impl Compiler for Java {
    fn code_name(&self) -> &str {
        "java"
    }

    fn source_name(&self) -> &str {
        "Main.java"
    }

    fn binary_name(&self) -> &str {
        "Main"
    }

    fn artifact_name(&self) -> &str {
        "Main.class"
    }

    fn command(&self) -> Vec<String> {
        ["javac", "-cp", ".", "Main.java"].map(String::from).to_vec()
    }
}

/// Runs a class on the JVM with the heap capped at the memory limit
pub struct JavaProfile;

impl RunProfile for JavaProfile {
    fn code_name(&self) -> &str {
        "java"
    }

    fn command(&self, binary_name: &str, memory_limit_mb: u32) -> Vec<String> {
        let mut cmd = vec!["java".to_string()];
        if memory_limit_mb > 0 {
            cmd.push(format!("-Xmx{memory_limit_mb}M"));
        }
        cmd.push("-DONLINE_JUDGE=true".to_string());
        cmd.push(binary_name.to_string());
        cmd
    }

    // The JVM reserves far more address space than it uses
    fn sandbox_memory_limit(&self) -> bool {
        false
    }
}
