//! Module files
//!
//! Compiling a file that defines modules also writes one `<name>.mod` per
//! module next to the output: a JSON descriptor of the module's variables
//! and procedure interfaces. `fortc mod` reads one back into a fresh ASR.

use super::fold::{Constant, fold};
use super::*;
use crate::error::{ErrorKind, ErrorRecord, StageResult, ToolStage};
use std::path::{Path, PathBuf};

const FORMAT: &str = "fortc-mod";
const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFile {
    pub format: String,
    pub version: u32,
    pub name: String,
    pub variables: Vec<ModVariable>,
    pub procedures: Vec<ModProcedure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModVariable {
    pub name: String,
    pub ty: Type,
    pub parameter: bool,
    pub value: Option<Constant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModArg {
    pub name: String,
    pub ty: Type,
    pub intent: VarIntent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModProcedure {
    pub name: String,
    pub args: Vec<ModArg>,
    /// Present for functions
    pub result: Option<ModArg>,
}

impl ModuleFile {
    /// Describe the module `id` of `tu`
    pub fn from_asr(tu: &TranslationUnit, id: SymbolId) -> Option<Self> {
        let Symbol::Module(module) = tu.symbol(id) else {
            return None;
        };
        let mut variables = Vec::new();
        let mut procedures = Vec::new();
        for sym in tu.scopes[module.scope].symbols.values() {
            match tu.symbol(*sym) {
                Symbol::Variable(v) => variables.push(ModVariable {
                    name: v.name.clone(),
                    ty: v.ty,
                    parameter: v.storage == Storage::Parameter,
                    value: v.init.as_ref().and_then(|e| fold(tu, e)),
                }),
                Symbol::Procedure(p) => {
                    let arg = |id: &SymbolId| {
                        tu.variable(*id).map(|v| ModArg {
                            name: v.name.clone(),
                            ty: v.ty,
                            intent: v.intent,
                        })
                    };
                    procedures.push(ModProcedure {
                        name: p.name.clone(),
                        args: p.args.iter().filter_map(arg).collect(),
                        result: p.return_var.as_ref().and_then(arg),
                    });
                }
                Symbol::Program(_) | Symbol::Module(_) => {}
            }
        }
        Some(Self {
            format: FORMAT.to_string(),
            version: VERSION,
            name: module.name.clone(),
            variables,
            procedures,
        })
    }

    pub fn to_json(&self) -> StageResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            ErrorRecord::internal("SerializationError", format!("module '{}': {}", self.name, e))
        })
    }

    pub fn parse(text: &str, origin: &Path) -> StageResult<Self> {
        let file: ModuleFile = serde_json::from_str(text).map_err(|e| {
            ErrorRecord::new(
                ErrorKind::Io,
                format!("{} is not a module file: {}", origin.display(), e),
            )
        })?;
        if file.format != FORMAT || file.version != VERSION {
            return Err(ErrorRecord::new(
                ErrorKind::Io,
                format!(
                    "{} has format {} version {}, expected {} version {}",
                    origin.display(),
                    file.format,
                    file.version,
                    FORMAT,
                    VERSION
                ),
            ));
        }
        Ok(file)
    }

    /// Recreate the module in `tu` with interface-only procedures
    pub fn load_into(&self, tu: &mut TranslationUnit) -> StageResult<SymbolId> {
        let global = tu.global_scope;
        if tu.scopes[global].symbols.contains_key(&self.name) {
            return Err(ErrorRecord::semantic(format!(
                "Symbol '{}' is already defined",
                self.name
            )));
        }
        let scope = tu.new_scope(Some(global));
        let module = tu.symbols.alloc(Symbol::Module(Module {
            name: self.name.clone(),
            scope,
            external: true,
        }));
        tu.scopes[global].symbols.insert(self.name.clone(), module);
        tu.scopes[scope].owner = Some(module);

        for v in &self.variables {
            let id = tu.symbols.alloc(Symbol::Variable(Variable {
                name: v.name.clone(),
                parent: scope,
                ty: v.ty,
                intent: VarIntent::Local,
                storage: if v.parameter {
                    Storage::Parameter
                } else {
                    Storage::Default
                },
                init: v.value.clone().map(Constant::into_expr),
            }));
            tu.scopes[scope].symbols.insert(v.name.clone(), id);
        }

        for p in &self.procedures {
            let proc_scope = tu.new_scope(Some(scope));
            let id = tu.symbols.alloc(Symbol::Procedure(Procedure {
                name: p.name.clone(),
                scope: proc_scope,
                parent: scope,
                args: Vec::new(),
                return_var: None,
                body: Vec::new(),
            }));
            tu.scopes[scope].symbols.insert(p.name.clone(), id);
            tu.scopes[proc_scope].owner = Some(id);
            let mut add = |tu: &mut TranslationUnit, arg: &ModArg| {
                let var = tu.symbols.alloc(Symbol::Variable(Variable {
                    name: arg.name.clone(),
                    parent: proc_scope,
                    ty: arg.ty,
                    intent: arg.intent,
                    storage: Storage::Default,
                    init: None,
                }));
                tu.scopes[proc_scope].symbols.insert(arg.name.clone(), var);
                var
            };
            let args: Vec<SymbolId> = p.args.iter().map(|a| add(tu, a)).collect();
            let return_var = p.result.as_ref().map(|r| add(tu, r));
            if let Symbol::Procedure(proc) = tu.symbol_mut(id) {
                proc.args = args;
                proc.return_var = return_var;
            }
        }
        Ok(module)
    }
}

/// Write `<module>.mod` into `dir` for every module defined in `tu`
pub fn save_module_files(tu: &TranslationUnit, dir: &Path) -> StageResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    for id in tu.modules() {
        let Some(file) = ModuleFile::from_asr(tu, id) else {
            continue;
        };
        let path = dir.join(format!("{}.mod", file.name));
        let json = file.to_json()?;
        std::fs::write(&path, json).map_err(|e| {
            ErrorRecord::new(
                ErrorKind::Toolchain(ToolStage::Compile),
                format!("Saving module file '{}' failed: {}", path.display(), e),
            )
        })?;
        tracing::debug!("wrote module file {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    const SRC: &str = "\
module geometry
implicit none
real, parameter :: pi = 3.5
integer :: counter
contains
real function area(r)
real, intent(in) :: r
area = pi * r * r
end function
subroutine bump(n)
integer, intent(inout) :: n
n = n + 1
end subroutine
end module
";

    fn module_file() -> ModuleFile {
        let tokens = lex(SRC).unwrap();
        let ast = parse(&tokens, SRC).unwrap();
        let tu = build(&ast).unwrap();
        ModuleFile::from_asr(&tu, tu.modules()[0]).unwrap()
    }

    #[test]
    fn test_describes_interface() {
        let file = module_file();
        assert_eq!(file.name, "geometry");
        assert_eq!(file.variables.len(), 2);
        assert_eq!(file.variables[0].value, Some(Constant::Real(3.5)));
        assert_eq!(file.procedures[0].result.as_ref().map(|r| r.ty), Some(Type::Real));
        assert_eq!(file.procedures[1].args[0].intent, VarIntent::InOut);
    }

    #[test]
    fn test_load_into_fresh_unit() {
        let file = module_file();
        let json = file.to_json().unwrap();
        let back = ModuleFile::parse(&json, Path::new("geometry.mod")).unwrap();
        let mut tu = TranslationUnit::new();
        let id = back.load_into(&mut tu).unwrap();
        let Symbol::Module(m) = tu.symbol(id) else {
            panic!("expected module");
        };
        assert!(m.external);
        assert!(tu.lookup(m.scope, "bump").is_some());
        assert!(verify::verify(&tu).is_ok());
    }

    #[test]
    fn test_rejects_foreign_json() {
        let err = ModuleFile::parse("{\"x\": 1}", Path::new("x.mod")).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_save_writes_one_file_per_module() {
        let tokens = lex(SRC).unwrap();
        let tu = build(&parse(&tokens, SRC).unwrap()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = save_module_files(&tu, dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("geometry.mod")]);
    }
}
