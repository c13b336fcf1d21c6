use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;

use crate::config::IntSize;
use crate::error::TranslateError;

/// Kind of AST node a macro expansion maps to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub enum AstKind {
    /// Expansion produces a declaration
    Decl,
    /// Expansion produces a statement
    Stmt,
    /// Expansion produces a type location
    TypeLoc,
    /// Expansion produces an expression
    Expr,
}

/// Kind of a macro definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MacroKind {
    /// `#define NAME body`
    ObjectLike,
    /// `#define NAME(args) body`
    FunctionLike,
}

impl std::fmt::Display for MacroKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacroKind::ObjectLike => write!(f, "Object-like"),
            MacroKind::FunctionLike => write!(f, "Function-like"),
        }
    }
}

/// A parsed `file:line:col` source location
///
/// Locations are parsed from the right so file paths containing `:` are
/// handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    /// Path of the file containing the location
    pub file: String,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub col: usize,
}

impl SourceLocation {
    /// Parse a `file:line:col` string
    ///
    /// # Errors
    /// Returns [`TranslateError::InvalidLocation`] when the string does not
    /// have the expected shape or the numeric fields do not parse.
    pub fn parse(s: &str) -> Result<Self, TranslateError> {
        let mut parts = s.rsplitn(3, ':');
        let (Some(col), Some(line), Some(file)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TranslateError::InvalidLocation(s.to_string()));
        };
        let line = line
            .parse()
            .map_err(|_| TranslateError::InvalidLocation(s.to_string()))?;
        let col = col
            .parse()
            .map_err(|_| TranslateError::InvalidLocation(s.to_string()))?;
        Ok(SourceLocation {
            file: file.to_string(),
            line,
            col,
        })
    }
}

/// Extract the file component of a `file:line:col` location string
///
/// Falls back to the whole string when it does not have three components.
pub(crate) fn location_filename(location: &str) -> &str {
    location.rsplitn(3, ':').nth(2).unwrap_or(location)
}

/// A macro definition record produced by the analyzer
///
/// Uniquely keyed by its definition location; within one
/// [`PreprocessorData`] no two macros share a name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Macro {
    /// Macro name
    pub name: String,
    /// True for `#define NAME body`, false for `#define NAME(args) body`
    pub is_object_like: bool,
    /// Whether the definition location refers to a real file entry
    pub is_definition_location_valid: bool,
    /// Whether the definition appears at global scope
    pub is_defined_at_global_scope: bool,
    /// Raw replacement tokens, as text
    pub body: String,
    /// `file:line:col` of the start of the definition
    pub definition_location: String,
    /// `file:line:col` of the end of the definition
    pub end_definition_location: String,
}

impl Macro {
    /// Whether this is a function-like macro
    #[must_use]
    pub fn is_function_like(&self) -> bool {
        !self.is_object_like
    }

    /// The kind of this macro
    #[must_use]
    pub fn kind(&self) -> MacroKind {
        if self.is_object_like {
            MacroKind::ObjectLike
        } else {
            MacroKind::FunctionLike
        }
    }

    /// Whether the macro was defined under the given path prefix
    ///
    /// An empty prefix accepts every macro with a valid definition location;
    /// this is an explicit rule, not a property of `starts_with`.
    #[must_use]
    pub fn defined_in(&self, prefix: &str) -> bool {
        if !self.is_definition_location_valid {
            return false;
        }
        prefix.is_empty() || self.definition_location.starts_with(prefix)
    }

    /// File component of the definition location
    #[must_use]
    pub fn definition_filename(&self) -> &str {
        location_filename(&self.definition_location)
    }
}

/// A single invocation of a macro, with every fact the analyzer collected
/// about it
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Invocation {
    /// Name of the invoked macro
    pub name: String,
    /// `file:line:col` of the defining `#define`, linking back to the macro
    pub definition_location: String,
    /// `file:line:col` of the expansion site
    pub invocation_location: String,
    /// AST node kind the expansion maps to
    #[serde(rename = "ASTKind")]
    pub ast_kind: AstKind,
    /// Type signature rendered as a C declarator with a placeholder
    /// identifier
    pub type_signature: String,

    /// Nesting depth; 0 means the expansion occurs directly in source
    pub invocation_depth: u32,
    /// Number of AST roots the expansion maps to
    #[serde(rename = "NumASTRoots")]
    pub num_ast_roots: u32,
    /// Number of arguments passed at this invocation
    pub num_arguments: u32,

    /// Whether the body uses the `#` operator
    pub has_stringification: bool,
    /// Whether the body uses the `##` operator
    pub has_token_pasting: bool,
    /// Whether argument positions align with AST subexpressions
    pub has_aligned_arguments: bool,
    /// Whether the name collides with another declaration
    pub has_same_name_as_other_declaration: bool,

    /// Whether the expansion is a control-flow statement (`return`, `goto`,
    /// `break`, `continue`)
    pub is_expansion_control_flow_stmt: bool,

    /// Whether the body references a macro defined after this macro
    pub does_body_reference_macro_defined_after_macro: bool,
    /// Whether the body references a declaration declared after this macro
    pub does_body_reference_decl_declared_after_macro: bool,
    /// Whether the body contains a declaration-reference expression
    pub does_body_contain_decl_ref_expr: bool,
    /// Whether the body ends with a compound statement
    pub does_body_end_with_compound_stmt: bool,
    /// Whether a subexpression expanded from the body has a local type
    pub does_subexpression_expanded_from_body_have_local_type: bool,
    /// Whether a subexpression expanded from the body has a type defined
    /// after this macro
    pub does_subexpression_expanded_from_body_have_type_defined_after_macro: bool,

    /// Whether any argument has side effects
    pub does_any_argument_have_side_effects: bool,
    /// Whether any argument contains a declaration-reference expression
    pub does_any_argument_contain_decl_ref_expr: bool,

    /// Whether the body introduces no identifier that captures or is
    /// captured by names at the call site
    pub is_hygienic: bool,
    /// Whether the expansion's ICE value is representable by a 32-bit int
    #[serde(rename = "IsICERepresentableByInt32")]
    pub is_ice_representable_by_int32: bool,
    /// Whether the expansion's ICE value is representable by a 16-bit int
    #[serde(rename = "IsICERepresentableByInt16")]
    pub is_ice_representable_by_int16: bool,
    /// Whether the definition location refers to a real file entry
    pub is_definition_location_valid: bool,
    /// Whether the invocation location refers to a real file entry
    pub is_invocation_location_valid: bool,
    /// Whether the invoked macro is object-like
    pub is_object_like: bool,
    /// Whether this expansion occurs inside another macro's argument list
    pub is_invoked_in_macro_argument: bool,
    /// Whether the name appears in a `#if`/`#ifdef` condition
    #[serde(rename = "IsNamePresentInCPPConditional")]
    pub is_name_present_in_cpp_conditional: bool,
    /// Whether the expansion is an integral constant expression
    #[serde(rename = "IsExpansionICE")]
    pub is_expansion_ice: bool,

    /// Whether the expansion's type is null (no semantic type)
    pub is_expansion_type_null: bool,
    /// Whether the expansion's type is anonymous
    pub is_expansion_type_anonymous: bool,
    /// Whether the expansion's type is declared at local scope
    pub is_expansion_type_local_type: bool,
    /// Whether the expansion's type is defined after this macro
    pub is_expansion_type_defined_after_macro: bool,
    /// Whether the expansion's type is `void`
    pub is_expansion_type_void: bool,
    /// Whether the expansion's type is a function type
    pub is_expansion_type_function_type: bool,

    /// Whether any argument's type is null
    pub is_any_argument_type_null: bool,
    /// Whether any argument's type is anonymous
    pub is_any_argument_type_anonymous: bool,
    /// Whether any argument's type is declared at local scope
    pub is_any_argument_type_local_type: bool,
    /// Whether any argument's type is defined after this macro
    pub is_any_argument_type_defined_after_macro: bool,
    /// Whether any argument's type is `void`
    pub is_any_argument_type_void: bool,
    /// Whether any argument's type is a function type
    pub is_any_argument_type_function_type: bool,

    /// Whether the expansion site requires a modifiable lvalue
    pub is_invoked_where_modifiable_value_required: bool,
    /// Whether the expansion site requires an addressable lvalue
    pub is_invoked_where_addressable_value_required: bool,
    /// Whether any argument is expanded where a constant expression is
    /// required
    pub is_any_argument_expanded_where_const_expr_required: bool,
    /// Whether the expansion site requires an integral constant expression
    #[serde(rename = "IsInvokedWhereICERequired")]
    pub is_invoked_where_ice_required: bool,
    /// Whether the expansion site requires a (general) constant expression
    pub is_invoked_where_constant_expression_required: bool,

    /// Whether any argument is expanded where a modifiable lvalue is
    /// required
    pub is_any_argument_expanded_where_modifiable_value_required: bool,
    /// Whether any argument is expanded where an addressable lvalue is
    /// required
    pub is_any_argument_expanded_where_addressable_value_required: bool,
    /// Whether any argument is only conditionally evaluated by the body
    pub is_any_argument_conditionally_evaluated: bool,
    /// Whether any argument is never expanded by the body
    pub is_any_argument_never_expanded: bool,
    /// Whether any argument is not an expression
    pub is_any_argument_not_an_expression: bool,
}

impl Invocation {
    /// File component of the definition location
    ///
    /// When the location is invalid the raw string is returned unchanged.
    #[must_use]
    pub fn definition_location_filename(&self) -> &str {
        if !self.is_definition_location_valid {
            return &self.definition_location;
        }
        location_filename(&self.definition_location)
    }

    /// Whether the invoked macro is function-like
    #[must_use]
    pub fn is_function_like(&self) -> bool {
        !self.is_object_like
    }

    /// Whether this expansion occurs in source position: depth 0, not
    /// inside a macro argument, both locations valid
    #[must_use]
    pub fn is_top_level_non_argument(&self) -> bool {
        self.invocation_depth == 0
            && !self.is_invoked_in_macro_argument
            && self.is_invocation_location_valid
            && self.is_definition_location_valid
    }

    /// Whether the expansion maps to exactly one AST root with aligned
    /// arguments
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.is_top_level_non_argument()
            && self.num_ast_roots == 1
            && self.has_aligned_arguments
    }

    /// Whether the analyzer collected full semantic facts for this
    /// invocation
    ///
    /// This is the precondition every downstream predicate assumes.
    #[must_use]
    pub fn has_semantic_data(&self) -> bool {
        self.is_top_level_non_argument()
            && !self.is_any_argument_never_expanded
            && self.is_aligned()
            && !(self.ast_kind == AstKind::Expr && self.is_expansion_type_null)
    }

    /// Whether the expansion is itself a constant expression: an `Expr`
    /// whose body references no declaration
    #[must_use]
    pub fn is_expansion_constant_expression(&self) -> bool {
        self.ast_kind == AstKind::Expr && !self.does_body_contain_decl_ref_expr
    }

    /// Whether the expansion site requires a modifiable or addressable
    /// lvalue
    #[must_use]
    pub fn requires_lvalue(&self) -> bool {
        self.is_invoked_where_modifiable_value_required
            || self.is_invoked_where_addressable_value_required
    }

    /// Whether any argument is expanded where a modifiable or addressable
    /// lvalue is required
    #[must_use]
    pub fn any_argument_requires_lvalue(&self) -> bool {
        self.is_any_argument_expanded_where_modifiable_value_required
            || self.is_any_argument_expanded_where_addressable_value_required
    }

    /// Whether a C function would need call-by-name semantics to preserve
    /// behavior: some argument has side effects or is only conditionally
    /// evaluated
    #[must_use]
    pub fn is_called_by_name(&self) -> bool {
        self.does_any_argument_have_side_effects || self.is_any_argument_conditionally_evaluated
    }

    /// Whether translating would force edits to declarations elsewhere in
    /// the program
    #[must_use]
    pub fn must_alter_declarations_to_transform(&self) -> bool {
        self.has_same_name_as_other_declaration
            || self.does_body_reference_macro_defined_after_macro
            || self.does_body_reference_decl_declared_after_macro
            || self.does_subexpression_expanded_from_body_have_local_type
            || self.does_subexpression_expanded_from_body_have_type_defined_after_macro
            || self.is_expansion_type_anonymous
            || self.is_expansion_type_local_type
            || self.is_expansion_type_defined_after_macro
            || self.ast_kind == AstKind::TypeLoc
    }

    /// Whether the invocation could become a C function at all: a statement
    /// or expression not expanded where an ICE is required
    pub(crate) fn can_be_turned_into_function(&self) -> bool {
        matches!(self.ast_kind, AstKind::Stmt | AstKind::Expr)
            && !self.is_invoked_where_ice_required
    }

    /// Whether a behavior-preserving translation would need preprocessor
    /// metaprogramming: stringification, token pasting, control-flow
    /// expansion, call-by-name with a non-expression argument, or a name
    /// inspected by a CPP conditional
    #[must_use]
    pub fn must_use_metaprogramming_to_transform(&self) -> bool {
        self.has_stringification
            || self.has_token_pasting
            || (self.has_semantic_data()
                && self.is_function_like()
                && self.can_be_turned_into_function()
                && self.is_any_argument_not_an_expression)
            || self.is_expansion_control_flow_stmt
            || self.is_name_present_in_cpp_conditional
    }

    /// Whether the expansion's ICE value fits the configured int width
    #[must_use]
    pub fn ice_fits(&self, int_size: IntSize) -> bool {
        match int_size {
            IntSize::Int16 => self.is_ice_representable_by_int16,
            IntSize::Int32 => self.is_ice_representable_by_int32,
        }
    }

    /// Whether the expansion or any argument has a function-pointer type
    #[must_use]
    pub fn has_function_pointer_type(&self) -> bool {
        self.is_expansion_type_function_type || self.is_any_argument_type_function_type
    }
}

/// The immutable triple consumed by classification: macros with their
/// invocation sets, the names the preprocessor itself inspected, and the
/// locally included file paths
///
/// Narrowed values are produced by the `restrict_to_*` methods; each is a
/// pure function of its predecessor, forming the lattice
/// `all -> source-only -> top-level-non-argument`.
#[derive(Clone, Debug, Default)]
pub struct PreprocessorData {
    /// Each macro mapped to its set of unique invocations, keyed by
    /// invocation location
    pub macros: IndexMap<Macro, Vec<Invocation>>,
    /// Names the preprocessor inspected in `#if`/`#ifdef` conditions
    pub inspected_macro_names: IndexSet<String>,
    /// File paths included with `#include "..."`
    pub local_includes: IndexSet<String>,
}

impl PreprocessorData {
    /// Create an empty preprocessor-data value
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to macros defined under the given source prefix
    ///
    /// An empty prefix keeps every macro with a valid definition location.
    #[must_use]
    pub fn restrict_to_source(&self, prefix: &str) -> Self {
        PreprocessorData {
            macros: self
                .macros
                .iter()
                .filter(|(m, _)| m.defined_in(prefix))
                .map(|(m, is)| (m.clone(), is.clone()))
                .collect(),
            inspected_macro_names: self.inspected_macro_names.clone(),
            local_includes: self.local_includes.clone(),
        }
    }

    /// Restrict to macros whose every invocation is top-level non-argument
    #[must_use]
    pub fn restrict_to_top_level_non_argument(&self) -> Self {
        PreprocessorData {
            macros: self
                .macros
                .iter()
                .filter(|(_, is)| is.iter().all(Invocation::is_top_level_non_argument))
                .map(|(m, is)| (m.clone(), is.clone()))
                .collect(),
            inspected_macro_names: self.inspected_macro_names.clone(),
            local_includes: self.local_includes.clone(),
        }
    }
}
