//! Keyword-based subject classifier.
//!
//! Documents are filed by scanning their title and abstract for keywords.
//! The taxonomy is a fixed, ordered table: fields are tried in [`Field`]
//! declaration order and the first one with a matching keyword wins, so
//! "Algebraic Geometry" lands in `algebra`. Matching is a case-insensitive
//! substring search; keywords are stored lower-case.

use crate::models::Field;
use tracing::debug;

/// Field → keyword table, in priority order. [`Field::Other`] is absent and
/// acts as the fallback.
pub const TAXONOMY: &[(Field, &[&str])] = &[
    (
        Field::Calculus,
        &[
            "calculus",
            "derivative",
            "integration",
            "integrals",
            "limits and continuity",
            "multivariable",
            "precalculus",
        ],
    ),
    (
        Field::Algebra,
        &[
            "algebra",
            "group theory",
            "ring theory",
            "commutative ring",
            "galois",
            "matrices",
            "matrix theory",
            "polynomial",
            "representation theory",
        ],
    ),
    (
        Field::Geometry,
        &[
            "geometry",
            "topology",
            "topological",
            "manifold",
            "euclid",
            "trigonometry",
            "curvature",
        ],
    ),
    (
        Field::Analysis,
        &[
            "analysis",
            "measure theory",
            "fourier",
            "banach",
            "hilbert space",
            "complex variable",
            "functional",
        ],
    ),
    (
        Field::Probability,
        &[
            "probability",
            "statistic",
            "stochastic",
            "random",
            "markov",
            "martingale",
            "brownian",
        ],
    ),
    (
        Field::NumberTheory,
        &[
            "number theory",
            "prime number",
            "primes",
            "diophantine",
            "modular form",
            "arithmetic geometry",
            "elliptic curve",
            "congruence",
        ],
    ),
    (
        Field::DiscreteMath,
        &[
            "discrete",
            "combinatori",
            "graph theory",
            "logic",
            "set theory",
            "algorithm",
            "computability",
        ],
    ),
    (
        Field::AppliedMath,
        &[
            "applied",
            "numerical",
            "optimization",
            "differential equation",
            "mathematical physics",
            "dynamical system",
            "modeling",
            "modelling",
        ],
    ),
];

/// Classify a document by its title and abstract.
///
/// Pure and deterministic. Returns [`Field::Other`] when no keyword matches.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(classify("Introduction to Linear Algebra", ""), Field::Algebra);
/// assert_eq!(classify("A treatise on widgets", ""), Field::Other);
/// ```
pub fn classify(title: &str, abstract_text: &str) -> Field {
    let title = title.to_lowercase();
    let abstract_text = abstract_text.to_lowercase();

    for (field, keywords) in TAXONOMY {
        if let Some(kw) = keywords
            .iter()
            .find(|kw| title.contains(*kw) || abstract_text.contains(*kw))
        {
            debug!(%field, keyword = kw, "Classified document");
            return *field;
        }
    }
    Field::Other
}
