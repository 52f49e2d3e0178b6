use super::{Compiler, ErrorStream};

fn fpc_command(mode: Option<&str>) -> Vec<String> {
    let mut cmd: Vec<String> = ["fpc", "-dONLINE_JUDGE", "-So", "-XS"]
        .map(String::from)
        .to_vec();
    cmd.extend(mode.map(String::from));
    cmd.extend(["-O2", "-o", "main", "main.pas"].map(String::from));
    cmd
}

/// Free Pascal
pub struct FPC;

impl Compiler for FPC {
    fn code_name(&self) -> &str {
        "fpc"
    }

    fn source_name(&self) -> &str {
        "main.pas"
    }

    fn binary_name(&self) -> &str {
        "main"
    }

    fn command(&self) -> Vec<String> {
        fpc_command(None)
    }

    // fpc prints its messages to stdout
    fn error_stream(&self) -> ErrorStream {
        ErrorStream::Stdout
    }

    fn strict_sv(&self) -> bool {
        true
    }
}

/// Free Pascal in Delphi compatibility mode
pub struct FPCCompat;

impl Compiler for FPCCompat {
    fn code_name(&self) -> &str {
        "fpc-delphi-compat"
    }

    fn source_name(&self) -> &str {
        "main.pas"
    }

    fn binary_name(&self) -> &str {
        "main"
    }

    fn command(&self) -> Vec<String> {
        fpc_command(Some("-Mdelphi"))
    }

    fn error_stream(&self) -> ErrorStream {
        ErrorStream::Stdout
    }

    fn strict_sv(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delphi_mode_flag() {
        assert_eq!(
            FPC.command(),
            ["fpc", "-dONLINE_JUDGE", "-So", "-XS", "-O2", "-o", "main", "main.pas"]
        );
        assert_eq!(
            FPCCompat.command(),
            ["fpc", "-dONLINE_JUDGE", "-So", "-XS", "-Mdelphi", "-O2", "-o", "main", "main.pas"]
        );
    }
}
