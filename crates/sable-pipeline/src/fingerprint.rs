//! Two-stream file fingerprinting.
//!
//! A file hashes into two independent streams: the *definitions* stream
//! visits declarations only (class names, ancestors, method names with
//! arities, signatures, visibility, static-ness) in tree order, and the
//! *usages* stream visits the opaque expressions inside bodies. Fingerprints
//! run over the flattened tree so hoisted methods participate in the
//! definitions hash with their final static-ness.

use sable_ast::{flatten, ClassName, Expr, Send};
use sable_core::{DefinitionsHash, FileContent, FileHash, UsagesHash, HASH_VALUE_MASK};
use sable_parse::Parser;
use sha2::{Digest, Sha256};

/// Fingerprints one file.
///
/// A file that fails to parse gets `definitions = INVALID` (forcing the slow
/// path) and a usages hash over the raw text so distinct broken revisions
/// still compare unequal.
pub fn compute_file_hash(content: &FileContent, parser: &dyn Parser) -> FileHash {
    let tree = match parser.parse(content.source()) {
        Ok(tree) => flatten(tree),
        Err(err) => {
            tracing::debug!(
                target = "sable.pipeline",
                path = content.path(),
                line = err.line,
                "fingerprinting unparseable file: {}",
                err.message
            );
            let mut usages = HashStream::new();
            usages.text(content.source());
            return FileHash {
                definitions: DefinitionsHash::invalid(),
                usages: UsagesHash {
                    hash: usages.finish(),
                },
            };
        }
    };

    let mut streams = Streams {
        definitions: HashStream::new(),
        usages: HashStream::new(),
    };
    streams.definitions.text(content.strict().as_str());
    streams.walk(&tree);
    FileHash {
        definitions: DefinitionsHash {
            hierarchy_hash: streams.definitions.finish(),
        },
        usages: UsagesHash {
            hash: streams.usages.finish(),
        },
    }
}

struct Streams {
    definitions: HashStream,
    usages: HashStream,
}

impl Streams {
    fn walk(&mut self, expr: &Expr) {
        match expr {
            Expr::EmptyTree => {}
            Expr::Seq(stats) => stats.iter().for_each(|e| self.walk(e)),
            Expr::ClassDef(class) => {
                self.definitions.text("class");
                match &class.name {
                    ClassName::Ident(name) => self.definitions.text(name),
                    ClassName::Singleton => self.definitions.text("<<self>>"),
                }
                for ancestor in &class.ancestors {
                    self.definitions.text("<");
                    self.definitions.text(ancestor);
                }
                class.body.iter().for_each(|e| self.walk(e));
            }
            Expr::MethodDef(method) => {
                self.method_declaration(method, None);
            }
            Expr::Send(send) if send.is_sig() => {
                self.definitions.text("sig");
                for arg in &send.args {
                    if let Expr::Lit(lit) = arg {
                        self.definitions.text(&lit.text);
                    }
                }
            }
            Expr::Send(send) if send.is_method_modifier() => {
                let Expr::MethodDef(method) = &send.args[0] else {
                    unreachable!("is_method_modifier guarantees a method argument");
                };
                self.method_declaration(method, Some(send));
            }
            Expr::Send(send) => {
                self.usages.text(&send.fun);
                send.args.iter().for_each(|e| self.walk(e));
            }
            Expr::Lit(lit) => self.usages.text(&lit.text),
        }
    }

    fn method_declaration(&mut self, method: &sable_ast::MethodDef, modifier: Option<&Send>) {
        self.definitions.text("def");
        self.definitions.text(&method.name);
        self.definitions.word(method.params.len() as u64);
        for param in &method.params {
            self.definitions.text(param);
        }
        self.definitions.word(u64::from(method.is_self));
        self.definitions
            .text(modifier.map(|send| send.fun.as_str()).unwrap_or("public"));
        method.body.iter().for_each(|e| self.walk(e));
    }
}

/// Accumulates length-prefixed chunks into a SHA-256 digest folded to the
/// low 62-bit hash space.
struct HashStream {
    hasher: Sha256,
}

impl HashStream {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    fn text(&mut self, text: &str) {
        self.word(text.len() as u64);
        self.hasher.update(text.as_bytes());
    }

    fn word(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    fn finish(self) -> u64 {
        let digest = self.hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes) & HASH_VALUE_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sable_core::StrictLevel;
    use sable_parse::ScriptParser;

    fn hash(text: &str) -> FileHash {
        let content = FileContent::new("a.rb", text, sable_parse::strict_level_of(text));
        compute_file_hash(&content, &ScriptParser::new())
    }

    #[test]
    fn identical_sources_hash_identically() {
        let a = hash("class A\n  def f\n    1\n  end\nend\n");
        let b = hash("class A\n  def f\n    1\n  end\nend\n");
        assert_eq!(a, b);
    }

    #[test]
    fn body_edits_keep_the_definitions_hash() {
        let before = hash("class A; def f; 1; end; end");
        let after = hash("class A; def f; 2; end; end");
        assert_eq!(before.definitions, after.definitions);
        assert_ne!(before.usages, after.usages);
    }

    #[test]
    fn arity_changes_change_the_definitions_hash() {
        let before = hash("class A; def f; 1; end; end");
        let after = hash("class A; def f(x); x; end; end");
        assert_ne!(before.definitions, after.definitions);
    }

    #[test]
    fn signature_changes_change_the_definitions_hash() {
        let before = hash("class A\n  sig {returns(Integer)}\n  def f\n    1\n  end\nend\n");
        let after = hash("class A\n  sig {returns(String)}\n  def f\n    1\n  end\nend\n");
        assert_ne!(before.definitions, after.definitions);
    }

    #[test]
    fn visibility_changes_change_the_definitions_hash() {
        let before = hash("class A\n  def f\n  end\nend\n");
        let after = hash("class A\n  private def f\n  end\nend\n");
        assert_ne!(before.definitions, after.definitions);
    }

    #[test]
    fn ancestor_changes_change_the_definitions_hash() {
        let before = hash("class B\nend\n");
        let after = hash("class B < A\nend\n");
        assert_ne!(before.definitions, after.definitions);
    }

    #[test]
    fn strictness_sigil_changes_change_the_definitions_hash() {
        let before = hash("# typed: false\nclass A\nend\n");
        let after = hash("# typed: strict\nclass A\nend\n");
        assert_ne!(before.definitions, after.definitions);
    }

    #[test]
    fn nested_methods_fingerprint_like_their_hoisted_form() {
        // Fingerprints run after flattening, so a nested definition and its
        // hoisted equivalent expose the same external surface.
        let nested = hash("class A\n  def f\n    def self.g\n    end\n  end\nend\n");
        let hoisted = hash("class A\n  def f\n  end\n  def self.g\n  end\nend\n");
        assert_eq!(nested.definitions, hoisted.definitions);
    }

    #[test]
    fn syntax_errors_yield_an_invalid_definitions_hash() {
        let broken = hash("class A\n  def f(\n");
        assert!(broken.definitions.is_invalid());

        let other = hash("class A\n  def g(\n");
        assert!(other.definitions.is_invalid());
        // Distinct broken revisions still compare unequal through usages.
        assert_ne!(broken.usages, other.usages);
    }

    #[test]
    fn strict_level_is_derived_from_the_sigil() {
        let content = FileContent::new(
            "a.rb",
            "# typed: strict\nclass A; end",
            sable_parse::strict_level_of("# typed: strict\nclass A; end"),
        );
        assert_eq!(content.strict(), StrictLevel::Strict);
    }
}
