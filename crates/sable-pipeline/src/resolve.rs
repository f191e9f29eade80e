//! Populates a symbol table from indexed trees.
//!
//! This is the seam in front of the external inference engine: it enters
//! classes and methods (with arity, visibility, static-ness, and attached
//! signatures) into a [`GlobalState`] and carries each file's diagnostics
//! over, but performs no type inference.
//!
//! Resolution is the long-running part of a slow-path typecheck, so it checks
//! the caller-supplied cancellation probe between files.

use sable_ast::{ClassName, Expr, MethodDef, Send};
use sable_core::{GlobalState, MethodProps, SymbolId, SymbolLoc, Visibility};

use crate::index::ParsedFile;

/// Resolves `trees` into `gs`, in order.
///
/// Returns `true` if `cancelled` fired before completion; `gs` is then left
/// partially updated and must be discarded by the caller.
pub fn resolve_trees(
    gs: &mut GlobalState,
    trees: &[ParsedFile],
    cancelled: &mut dyn FnMut() -> bool,
) -> bool {
    for parsed in trees {
        if cancelled() {
            tracing::debug!(
                target = "sable.pipeline",
                file = parsed.file.to_raw(),
                "resolution cancelled"
            );
            return true;
        }
        resolve_file(gs, parsed);
    }
    false
}

fn resolve_file(gs: &mut GlobalState, parsed: &ParsedFile) {
    gs.set_diagnostics(parsed.file, parsed.diagnostics.clone());

    let stats: &[Expr] = match &parsed.tree {
        Expr::Seq(stats) => stats,
        other => std::slice::from_ref(other),
    };
    let root = gs.root();
    let mut scope = Scope {
        gs,
        file: parsed.file,
        owner: root,
        in_singleton: false,
    };
    scope.body(stats);
}

struct Scope<'gs> {
    gs: &'gs mut GlobalState,
    file: sable_core::FileId,
    owner: SymbolId,
    in_singleton: bool,
}

impl Scope<'_> {
    fn body(&mut self, stats: &[Expr]) {
        let mut pending_sig: Option<String> = None;
        for stat in stats {
            match stat {
                Expr::ClassDef(class) => {
                    pending_sig = None;
                    match &class.name {
                        ClassName::Ident(name) => {
                            let owner = self.gs.enter_class(
                                name,
                                &class.ancestors,
                                Some(SymbolLoc {
                                    file: self.file,
                                    line: class.loc.line,
                                }),
                            );
                            let mut inner = Scope {
                                gs: &mut *self.gs,
                                file: self.file,
                                owner,
                                in_singleton: false,
                            };
                            inner.body(&class.body);
                        }
                        ClassName::Singleton => {
                            let mut inner = Scope {
                                gs: &mut *self.gs,
                                file: self.file,
                                owner: self.owner,
                                in_singleton: true,
                            };
                            inner.body(&class.body);
                        }
                    }
                }
                Expr::MethodDef(method) => {
                    let sig = pending_sig.take();
                    self.method(method, Visibility::Public, sig);
                }
                Expr::Send(send) if send.is_sig() => {
                    pending_sig = sig_text(send);
                }
                Expr::Send(send) if send.is_method_modifier() => {
                    let Expr::MethodDef(method) = &send.args[0] else {
                        unreachable!("is_method_modifier guarantees a method argument");
                    };
                    let sig = pending_sig.take();
                    self.method(method, visibility_from(&send.fun), sig);
                }
                _ => {
                    pending_sig = None;
                }
            }
        }
    }

    fn method(&mut self, method: &MethodDef, visibility: Visibility, sig: Option<String>) {
        self.gs.enter_method(
            self.owner,
            &method.name,
            MethodProps {
                arity: method.params.len() as u8,
                visibility,
                is_self_method: method.is_self || self.in_singleton,
                sig,
            },
            Some(SymbolLoc {
                file: self.file,
                line: method.loc.line,
            }),
        );
    }
}

fn sig_text(send: &Send) -> Option<String> {
    send.args.iter().find_map(|arg| match arg {
        Expr::Lit(lit) => Some(lit.text.clone()),
        _ => None,
    })
}

fn visibility_from(fun: &str) -> Visibility {
    match fun {
        "private" => Visibility::Private,
        "protected" => Visibility::Protected,
        "private_class_method" => Visibility::PrivateClassMethod,
        _ => Visibility::Public,
    }
}
