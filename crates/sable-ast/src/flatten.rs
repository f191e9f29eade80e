//! Flattens nested method definitions.
//!
//! After this pass, once a traversal reaches a non-definition node it will
//! never find a method definition deeper in the tree. Anything that travels
//! with a method travels here too: `sig` annotations and visibility-modifier
//! sends wrapping a method move together with it, and the static-ness of
//! hoisted methods is restamped from the nesting context they were found in.
//!
//! The walk maintains, per class scope, a queue of expressions to move and a
//! stack of in-progress definitions. Entering a definition that might move
//! reserves a queue slot; leaving it moves the node into the slot and leaves
//! an empty tree behind. Leaving a class scope drains the queue back into the
//! class body: staticness levels 0 and 1 are inlined (level > 0 restamped as
//! a self-method), and levels 2 and up are emitted as synthetic
//! singleton-class blocks.
//!
//! The decision of what counts as a modifier is purely syntactic; a user who
//! redefines `private` is not detected.

use crate::ast::{ClassDef, ClassName, Expr, Loc, MethodDef, Send};

/// Runs the pass over one file's tree.
pub fn flatten(tree: Expr) -> Expr {
    let mut walk = FlattenWalk::new();
    let tree = walk.walk(tree);
    let moved = walk.pop_scope();
    append_to_tree(tree, moved)
}

struct MovedItem {
    expr: Expr,
    static_level: usize,
}

struct Frame {
    /// Reserved queue slot; `None` for definitions at class-scope depth 0,
    /// which stay where they are.
    slot: Option<usize>,
    static_level: usize,
}

#[derive(Default)]
struct Methods {
    queue: Vec<Option<MovedItem>>,
    stack: Vec<Frame>,
}

struct FlattenWalk {
    scopes: Vec<Methods>,
}

impl FlattenWalk {
    fn new() -> Self {
        Self {
            scopes: vec![Methods::default()],
        }
    }

    fn walk(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Seq(stats) => Expr::Seq(stats.into_iter().map(|e| self.walk(e)).collect()),
            Expr::ClassDef(mut class) => {
                self.scopes.push(Methods::default());
                class.body = class.body.into_iter().map(|e| self.walk(e)).collect();
                let moved = self.pop_scope();
                class.body = place_in_class(class.body, moved, class.loc);
                Expr::ClassDef(class)
            }
            Expr::MethodDef(mut method) => {
                let static_level = self.static_level_for(&method);
                let slot = self.push_frame(static_level);
                method.body = method.body.into_iter().map(|e| self.walk(e)).collect();
                self.pop_frame();
                self.finish(Expr::MethodDef(method), slot, static_level)
            }
            Expr::Send(send) if send.is_sig() || send.is_method_modifier() => {
                self.walk_moving_send(send)
            }
            other => other,
        }
    }

    /// Sends that can move: `sig`s and visibility modifiers wrapping a method.
    /// The wrapped method does not get a frame of its own; moving the send
    /// moves the method along with it.
    fn walk_moving_send(&mut self, mut send: Send) -> Expr {
        let static_level = if send.is_method_modifier() {
            let Expr::MethodDef(method) = &send.args[0] else {
                unreachable!("is_method_modifier guarantees a method argument");
            };
            self.static_level_for(method)
        } else {
            0
        };

        let slot = self.push_frame(static_level);
        send.args = send
            .args
            .into_iter()
            .map(|arg| match arg {
                Expr::MethodDef(mut method) => {
                    method.body = method.body.into_iter().map(|e| self.walk(e)).collect();
                    Expr::MethodDef(method)
                }
                other => self.walk(other),
            })
            .collect();
        self.pop_frame();
        self.finish(Expr::Send(send), slot, static_level)
    }

    /// Moves `expr` into its reserved slot, or leaves it in place when it was
    /// found at class-scope depth 0.
    fn finish(&mut self, expr: Expr, slot: Option<usize>, static_level: usize) -> Expr {
        let Some(slot) = slot else {
            return expr;
        };
        let queue = &mut self.cur_scope().queue;
        debug_assert!(queue[slot].is_none());
        queue[slot] = Some(MovedItem { expr, static_level });
        Expr::EmptyTree
    }

    fn static_level_for(&mut self, method: &MethodDef) -> usize {
        let prev = self
            .cur_scope()
            .stack
            .last()
            .map(|frame| frame.static_level)
            .unwrap_or(0);
        prev + usize::from(method.is_self)
    }

    fn push_frame(&mut self, static_level: usize) -> Option<usize> {
        let methods = self.cur_scope();
        let slot = if methods.stack.is_empty() {
            None
        } else {
            methods.queue.push(None);
            Some(methods.queue.len() - 1)
        };
        methods.stack.push(Frame { slot, static_level });
        slot
    }

    fn pop_frame(&mut self) {
        let frame = self.cur_scope().stack.pop();
        debug_assert!(frame.is_some());
    }

    fn cur_scope(&mut self) -> &mut Methods {
        self.scopes.last_mut().expect("scope stack never empty")
    }

    fn pop_scope(&mut self) -> Vec<MovedItem> {
        let methods = self.scopes.pop().expect("scope stack never empty");
        debug_assert!(methods.stack.is_empty());
        methods
            .queue
            .into_iter()
            .map(|item| item.expect("every reserved slot was filled"))
            .collect()
    }
}

/// Drains a class scope's move queue back into the class body.
fn place_in_class(mut rhs: Vec<Expr>, moved: Vec<MovedItem>, loc: Loc) -> Vec<Expr> {
    if moved.is_empty() {
        return rhs;
    }
    if moved.len() == 1 && rhs.len() == 1 && rhs[0].is_empty_tree() {
        // It was only one method to begin with; put it back.
        let mut moved = moved;
        rhs[0] = moved.pop().expect("one item").expr;
        return rhs;
    }

    let mut moved = moved;
    let mut highest = 0;
    for i in 0..moved.len() {
        highest = highest.max(moved[i].static_level);
        // A sig that immediately precedes a method stays with it.
        if i > 0 {
            if let Expr::Send(send) = &moved[i - 1].expr {
                if send.is_sig() {
                    moved[i - 1].static_level = moved[i].static_level;
                }
            }
        }
    }

    // Levels 0 and 1 are inlined into the class body; 2 and up become
    // singleton-class blocks appended after it.
    let mut blocks: Vec<Vec<Expr>> = Vec::new();
    blocks.resize_with(highest.saturating_sub(1), Vec::new);

    for item in moved {
        let mut expr = item.expr;
        if let Expr::MethodDef(method) = &mut expr {
            method.is_self = item.static_level > 0;
        }
        if item.static_level <= 1 {
            rhs.push(expr);
        } else {
            blocks[item.static_level - 2].push(expr);
        }
    }

    for body in blocks {
        rhs.push(Expr::ClassDef(ClassDef {
            name: ClassName::Singleton,
            ancestors: Vec::new(),
            body,
            loc,
        }));
    }

    rhs
}

/// File-scope variant: hoisted top-level definitions are appended to the end
/// of the tree, with no staticness re-placement.
fn append_to_tree(tree: Expr, moved: Vec<MovedItem>) -> Expr {
    if moved.is_empty() {
        return tree;
    }
    let mut moved = moved;
    if moved.len() == 1 && tree.is_empty_tree() {
        return moved.pop().expect("one item").expr;
    }

    let mut stats = match tree {
        Expr::Seq(stats) => stats,
        other => vec![other],
    };
    stats.extend(moved.into_iter().map(|item| item.expr));
    Expr::Seq(stats)
}
