/*
 * compile.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Inheritance resolution.
//!
//! Compiling a document flattens its `extends` chain into a single
//! [`Content`] tree. The parent is compiled first, then every block override
//! of the child replaces the body of each same-named block in the parent
//! tree, wherever it is nested. The block node itself is kept so that a
//! template further down the chain can override it again.

use crate::ast::{Content, Document, Node};
use crate::environment::Environment;
use crate::error::CompileError;

impl Document {
    /// Resolve `extends` and `block` overrides into one content tree.
    ///
    /// Root documents compile to a copy of their own content.
    pub fn compile(&self, env: &Environment) -> Result<Content, CompileError> {
        compile_document(self, env, 0)
    }
}

fn compile_document(
    document: &Document,
    env: &Environment,
    depth: usize,
) -> Result<Content, CompileError> {
    let extending = match document {
        Document::Root(root) => return Ok(root.content.clone()),
        Document::Extending(extending) => extending,
    };

    let parent_name = &extending.extends.name;
    let max_depth = env.config().max_inheritance_depth;
    if depth >= max_depth {
        return Err(CompileError::RecursiveInheritance {
            name: parent_name.clone(),
            max_depth,
        });
    }

    tracing::debug!(parent = %parent_name, depth, "Resolving template inheritance");
    let parent = env.load_document(parent_name)?;
    let mut content = compile_document(&parent, env, depth + 1)?;

    for block in &extending.blocks {
        let replaced = replace_block(&mut content, &block.name, &block.content);
        if replaced == 0 {
            tracing::debug!(
                block = %block.name,
                parent = %parent_name,
                "Block override has no placeholder in parent, dropping it"
            );
        }
    }

    Ok(content)
}

/// Replace the body of every block named `name`; returns how many matched.
pub(crate) fn replace_block(content: &mut Content, name: &str, replacement: &Content) -> usize {
    let mut replaced = 0;
    for node in content.nodes_mut() {
        match node {
            Node::Block(block) if block.name == name => {
                block.content = replacement.clone();
                replaced += 1;
            }
            Node::Block(block) => replaced += replace_block(&mut block.content, name, replacement),
            Node::If(if_node) => {
                for (_, branch) in &mut if_node.branches {
                    replaced += replace_block(branch, name, replacement);
                }
                if let Some(else_branch) = &mut if_node.else_branch {
                    replaced += replace_block(else_branch, name, replacement);
                }
            }
            Node::For(for_node) => {
                replaced += replace_block(&mut for_node.body, name, replacement);
            }
            Node::Text(_) | Node::Output(_) | Node::Include(_) | Node::Set(_) => {}
        }
    }
    replaced
}
