use super::Compiler;

const OPTIONS: &[&str] = &[
    "-DONLINE_JUDGE",
    "-fno-asm",
    "-fno-optimize-sibling-calls",
    "-ffloat-store",
    "-lm",
    "-s",
    "-static",
    "-O2",
];

/// GNU C++
pub struct GCC;

impl Compiler for GCC {
    fn code_name(&self) -> &str {
        "g++"
    }

    fn source_name(&self) -> &str {
        "main.cpp"
    }

    fn binary_name(&self) -> &str {
        "main"
    }

    fn command(&self) -> Vec<String> {
        let mut cmd = vec!["g++".to_string()];
        cmd.extend(OPTIONS.iter().map(|s| s.to_string()));
        cmd.extend(["-o", "main", "main.cpp"].map(String::from));
        cmd
    }

    fn strict_sv(&self) -> bool {
        true
    }
}
