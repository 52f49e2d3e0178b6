use super::{Compiler, RunProfile};

/// C# through the Mono compiler
pub struct MonoCSharp;

impl Compiler for MonoCSharp {
    fn code_name(&self) -> &str {
        "mono-csharp"
    }

    fn source_name(&self) -> &str {
        "main.cs"
    }

    fn binary_name(&self) -> &str {
        "main.exe"
    }

    fn command(&self) -> Vec<String> {
        ["gmcs", "-o", "-out:main.exe", "-d:ONLINE_JUDGE", "main.cs"]
            .map(String::from)
            .to_vec()
    }
}

pub struct MonoProfile;

impl RunProfile for MonoProfile {
    fn code_name(&self) -> &str {
        "mono"
    }

    fn command(&self, binary_name: &str, _memory_limit_mb: u32) -> Vec<String> {
        vec!["mono".to_string(), binary_name.to_string()]
    }
}
