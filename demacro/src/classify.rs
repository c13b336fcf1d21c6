//! The classification engine: decides, per macro, whether a
//! behavior-preserving C-level replacement exists and which kind, or
//! rejects with a specific reason.
//!
//! Cascades are encoded as ordered `(predicate, reason)` tables evaluated
//! condition-major: for each condition in cascade order, every invocation
//! is tested, and the first condition violated by any invocation names the
//! rejection. Iteration order over the invocation set therefore cannot
//! change the outcome.

use std::fmt;

use crate::config::IntSize;
use crate::facts::{AstKind, Invocation, Macro, PreprocessorData};

/// The C construct a macro translates to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranslationTarget {
    /// `static inline void f(...) { body; }`
    VoidFunction,
    /// `static inline T f(...) { return body; }`
    NonVoidFunction,
    /// `static const T name = body;`
    GlobalVariable,
    /// `enum { name = body };`
    Enum,
}

impl fmt::Display for TranslationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            TranslationTarget::VoidFunction => "VoidFunction",
            TranslationTarget::NonVoidFunction => "NonVoidFunction",
            TranslationTarget::GlobalVariable => "GlobalVariable",
            TranslationTarget::Enum => "Enum",
        };
        write!(f, "{tag}")
    }
}

/// Why a macro cannot be translated
///
/// A closed enumeration covering every condition in the cascade. Rejections
/// are data, not errors: they are aggregated into statistics and mark the
/// macro's translation as absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// An invocation lacks semantic data or the body ends with a compound
    /// statement
    SyntacticallyInvalidProperty,
    /// The macro has no recorded invocation
    MacroNeverExpanded,
    /// Invocations disagree on the type signature
    Polymorphic,
    /// The macro is not defined at global scope
    NonGlobalScope,
    /// An expansion site requires a modifiable or addressable lvalue
    AddressableValueRequired,
    /// The macro's meaning depends on its environment: unhygienic body,
    /// definition in a locally included header, or declaration edits would
    /// be needed elsewhere
    CapturesEnvironment,
    /// Only preprocessor metaprogramming can reproduce the behavior
    UseMetaprogramming,
    /// An expansion site requires a constant expression, which no function
    /// or variable can provide
    InvokedWhereConstantExpressionRequired,
    /// The expansion is not itself a constant expression
    ExpansionNotConstantExpression,
    /// The expansion has type `void`, which a variable cannot carry
    ExpansionTypeVoid,
    /// The expansion is not an integral constant expression
    ExpansionNotIce,
    /// An ICE-requiring site has a value wider than the configured int
    InvokedWhereIceRequiredAndGreaterThanIntSize,
    /// An argument has side effects or is conditionally evaluated
    CalledByName,
    /// An argument is expanded where a constant expression is required
    ArgumentInvokedWhereConstExprRequired,
    /// An argument has type `void`
    ArgumentTypeVoid,
    /// An argument is expanded where a modifiable or addressable lvalue is
    /// required
    ArgumentAddressableValueRequired,
    /// An argument is not an expression
    ArgumentTypeNotExpression,
    /// The expansion is not a statement or expression a function body can
    /// hold
    InvalidStatementKind,
    /// The expansion type is not `void`, so a void function cannot carry it
    ExpansionTypeNotVoid,
    /// Analyzer limitation: the signature involves a function-pointer type
    DefinitionHasFunctionPointer,
    /// Analyzer limitation: the body references a declaration from a header
    BodyContainsDeclRefExpr,
}

impl RejectReason {
    /// Whether this rejection records an analyzer limitation rather than a
    /// semantic difference between macros and C
    #[must_use]
    pub fn is_technical_limitation(&self) -> bool {
        matches!(
            self,
            RejectReason::DefinitionHasFunctionPointer | RejectReason::BodyContainsDeclRefExpr
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            RejectReason::SyntacticallyInvalidProperty => "SyntacticallyInvalidProperty",
            RejectReason::MacroNeverExpanded => "MacroNeverExpanded",
            RejectReason::Polymorphic => "Polymorphic",
            RejectReason::NonGlobalScope => "NonGlobalScope",
            RejectReason::AddressableValueRequired => "AddressableValueRequired",
            RejectReason::CapturesEnvironment => "CapturesEnvironment",
            RejectReason::UseMetaprogramming => "UseMetaprogramming",
            RejectReason::InvokedWhereConstantExpressionRequired => {
                "InvokedWhereConstantExpressionRequired"
            }
            RejectReason::ExpansionNotConstantExpression => "ExpansionNotConstantExpression",
            RejectReason::ExpansionTypeVoid => "ExpansionTypeVoid",
            RejectReason::ExpansionNotIce => "ExpansionNotIce",
            RejectReason::InvokedWhereIceRequiredAndGreaterThanIntSize => {
                "InvokedWhereIceRequiredAndGreaterThanIntSize"
            }
            RejectReason::CalledByName => "CalledByName",
            RejectReason::ArgumentInvokedWhereConstExprRequired => {
                "ArgumentInvokedWhereConstExprRequired"
            }
            RejectReason::ArgumentTypeVoid => "ArgumentTypeVoid",
            RejectReason::ArgumentAddressableValueRequired => "ArgumentAddressableValueRequired",
            RejectReason::ArgumentTypeNotExpression => "ArgumentTypeNotExpression",
            RejectReason::InvalidStatementKind => "InvalidStatementKind",
            RejectReason::ExpansionTypeNotVoid => "ExpansionTypeNotVoid",
            RejectReason::DefinitionHasFunctionPointer => "DefinitionHasFunctionPointer",
            RejectReason::BodyContainsDeclRefExpr => "BodyContainsDeclRefExpr",
        };
        write!(f, "{tag}")
    }
}

/// The result of classifying one macro
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A behavior-preserving replacement of the given kind exists
    Translate(TranslationTarget),
    /// No replacement exists, for the given reason
    Reject(RejectReason),
}

impl Outcome {
    /// Whether this outcome carries a translation
    #[must_use]
    pub fn is_translation(&self) -> bool {
        matches!(self, Outcome::Translate(_))
    }

    /// The outcome tag written to reports: the target name or the reason
    /// name
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Outcome::Translate(target) => target.to_string(),
            Outcome::Reject(reason) => reason.to_string(),
        }
    }
}

/// One cascade row: a predicate every invocation must satisfy, and the
/// rejection named when any invocation violates it
type ConditionRow<'a> = (&'a dyn Fn(&Invocation) -> bool, RejectReason);

/// Evaluate a cascade condition-major: the first condition violated by any
/// invocation names the reason
fn first_violation(invocations: &[Invocation], cascade: &[ConditionRow<'_>]) -> Option<RejectReason> {
    for (holds, reason) in cascade {
        if invocations.iter().any(|i| !holds(i)) {
            return Some(*reason);
        }
    }
    None
}

/// Classify one macro against the evidence from every one of its
/// invocations
///
/// Returns exactly one outcome; the reason of a rejection is the first
/// failing condition in cascade order. The decision is deterministic and
/// independent of invocation-set iteration order.
#[must_use]
pub fn classify(
    m: &Macro,
    invocations: &[Invocation],
    pd: &PreprocessorData,
    int_size: IntSize,
) -> Outcome {
    // Structural preconditions, in order. "Has semantic data" is checked
    // once here and assumed by everything downstream.
    if !invocations.iter().all(Invocation::has_semantic_data) {
        return Outcome::Reject(RejectReason::SyntacticallyInvalidProperty);
    }
    let Some(first) = invocations.first() else {
        return Outcome::Reject(RejectReason::MacroNeverExpanded);
    };
    if invocations
        .iter()
        .any(|i| i.type_signature != first.type_signature)
    {
        return Outcome::Reject(RejectReason::Polymorphic);
    }
    if !m.is_defined_at_global_scope {
        return Outcome::Reject(RejectReason::NonGlobalScope);
    }

    // Global conditions, applied to every invocation.
    let no_compound_tail = |i: &Invocation| !i.does_body_end_with_compound_stmt;
    let no_lvalue_context = |i: &Invocation| !i.requires_lvalue();
    let environment_free = |i: &Invocation| {
        i.is_hygienic
            && !pd.local_includes.contains(i.definition_location_filename())
            && !i.must_alter_declarations_to_transform()
    };
    let no_metaprogramming = |i: &Invocation| {
        !i.must_use_metaprogramming_to_transform() && !pd.inspected_macro_names.contains(&i.name)
    };
    let global: [ConditionRow<'_>; 4] = [
        (&no_compound_tail, RejectReason::SyntacticallyInvalidProperty),
        (&no_lvalue_context, RejectReason::AddressableValueRequired),
        (&environment_free, RejectReason::CapturesEnvironment),
        (&no_metaprogramming, RejectReason::UseMetaprogramming),
    ];
    if let Some(reason) = first_violation(invocations, &global) {
        return Outcome::Reject(reason);
    }

    let target = if m.is_object_like {
        object_like_target(invocations, int_size)
    } else {
        function_like_target(invocations)
    };
    let target = match target {
        Ok(target) => target,
        Err(reason) => return Outcome::Reject(reason),
    };

    // Technical-limitation gate: these run after classification so
    // statistics can distinguish analyzer limitations from semantic
    // differences.
    if invocations.iter().any(Invocation::has_function_pointer_type) {
        return Outcome::Reject(RejectReason::DefinitionHasFunctionPointer);
    }
    if invocations.iter().any(|i| {
        i.does_body_contain_decl_ref_expr && i.definition_location_filename().ends_with(".h")
    }) {
        return Outcome::Reject(RejectReason::BodyContainsDeclRefExpr);
    }

    Outcome::Translate(target)
}

/// Object-like cascade: try `GlobalVariable` first, then `Enum`. When
/// neither applies the reason is the last failing condition.
fn object_like_target(
    invocations: &[Invocation],
    int_size: IntSize,
) -> Result<TranslationTarget, RejectReason> {
    let no_constant_context = |i: &Invocation| {
        !i.is_invoked_where_constant_expression_required && !i.is_invoked_where_ice_required
    };
    let constant_expression = Invocation::is_expansion_constant_expression;
    let non_void = |i: &Invocation| !i.is_expansion_type_void;
    let variable: [ConditionRow<'_>; 3] = [
        (
            &no_constant_context,
            RejectReason::InvokedWhereConstantExpressionRequired,
        ),
        (
            &constant_expression,
            RejectReason::ExpansionNotConstantExpression,
        ),
        (&non_void, RejectReason::ExpansionTypeVoid),
    ];
    if first_violation(invocations, &variable).is_none() {
        return Ok(TranslationTarget::GlobalVariable);
    }

    // Enumerators have to be ICEs.
    if !invocations.iter().all(|i| i.is_expansion_ice) {
        return Err(RejectReason::ExpansionNotIce);
    }
    // Only sites that actually demand an ICE constrain the width.
    let fits = invocations
        .iter()
        .filter(|i| i.is_invoked_where_ice_required)
        .all(|i| i.ice_fits(int_size));
    if !fits {
        return Err(RejectReason::InvokedWhereIceRequiredAndGreaterThanIntSize);
    }
    Ok(TranslationTarget::Enum)
}

/// Function-like cascade: argument conditions first, then `NonVoidFunction`,
/// then `VoidFunction`. When neither target applies the reason is the last
/// failing condition.
fn function_like_target(invocations: &[Invocation]) -> Result<TranslationTarget, RejectReason> {
    let by_value = |i: &Invocation| !i.is_called_by_name();
    let no_const_args = |i: &Invocation| !i.is_any_argument_expanded_where_const_expr_required;
    let no_void_args = |i: &Invocation| !i.is_any_argument_type_void;
    let no_lvalue_args = |i: &Invocation| !i.any_argument_requires_lvalue();
    let expression_args = |i: &Invocation| !i.is_any_argument_not_an_expression;
    let arguments: [ConditionRow<'_>; 5] = [
        (&by_value, RejectReason::CalledByName),
        (
            &no_const_args,
            RejectReason::ArgumentInvokedWhereConstExprRequired,
        ),
        (&no_void_args, RejectReason::ArgumentTypeVoid),
        (&no_lvalue_args, RejectReason::ArgumentAddressableValueRequired),
        (&expression_args, RejectReason::ArgumentTypeNotExpression),
    ];
    if let Some(reason) = first_violation(invocations, &arguments) {
        return Err(reason);
    }

    let no_constant_context = |i: &Invocation| {
        !i.is_invoked_where_constant_expression_required && !i.is_invoked_where_ice_required
    };
    let expression_kind = |i: &Invocation| i.ast_kind == AstKind::Expr;
    let statement_kind =
        |i: &Invocation| matches!(i.ast_kind, AstKind::Expr | AstKind::Stmt);
    let non_void = |i: &Invocation| !i.is_expansion_type_void;
    let void = |i: &Invocation| i.is_expansion_type_void;

    let non_void_function: [ConditionRow<'_>; 3] = [
        (
            &no_constant_context,
            RejectReason::InvokedWhereConstantExpressionRequired,
        ),
        (&expression_kind, RejectReason::InvalidStatementKind),
        (&non_void, RejectReason::ExpansionTypeVoid),
    ];
    if first_violation(invocations, &non_void_function).is_none() {
        return Ok(TranslationTarget::NonVoidFunction);
    }

    let void_function: [ConditionRow<'_>; 3] = [
        (
            &no_constant_context,
            RejectReason::InvokedWhereConstantExpressionRequired,
        ),
        (&statement_kind, RejectReason::InvalidStatementKind),
        (&void, RejectReason::ExpansionTypeNotVoid),
    ];
    match first_violation(invocations, &void_function) {
        None => Ok(TranslationTarget::VoidFunction),
        Some(reason) => Err(reason),
    }
}
