use super::Compiler;

/// GNU Fortran
pub struct GNUFortran;

impl Compiler for GNUFortran {
    fn code_name(&self) -> &str {
        "gfortran"
    }

    fn source_name(&self) -> &str {
        "main.f90"
    }

    fn binary_name(&self) -> &str {
        "main"
    }

    fn command(&self) -> Vec<String> {
        ["gfortran", "-DONLINE_JUDGE", "-O2", "-o", "main", "main.f90"]
            .map(String::from)
            .to_vec()
    }
}
