//! Directed synthesis strategies dispatched by requested operation
//! (§4.5.2). Each strategy consumes input/output examples and produces a
//! verified callable plus its source representation, or a structured
//! failure.

use super::extractor_dsl::{self, ExtractorExpr};
use nucleus_core::{Example, Literal, NucleusError, NucleusResult};

/// What a successful synthesis hands back to the evaluator: a callable
/// (represented here as the extractor expression it compiled to, which
/// the evaluator interprets) and a human-readable source string.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedProgram {
    pub expr: ExtractorExpr,
    pub source: String,
    pub strategy: &'static str,
}

/// Unquoted text form of an example's expected output — `Literal`'s
/// `Display` wraps strings in quotes (it doubles as DSL source
/// pretty-printing), but a `Match`/`Slice`/`Replace` candidate's raw
/// captured substring never carries quote characters of its own.
pub(crate) fn literal_text(lit: &Literal) -> String {
    match lit {
        Literal::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn examples_as_string_pairs(examples: &[Example]) -> Vec<(String, String)> {
    examples
        .iter()
        .map(|e| (e.input.clone(), literal_text(&e.output)))
        .collect()
}

/// *Currency parser* — detects the marker set `$ € £ ¥` and the
/// thousands/decimal convention, then emits a deterministic extractor
/// verified within 0.01 tolerance; falls back to the relational search
/// on mismatch.
pub fn synthesize_currency(examples: &[Example]) -> NucleusResult<SynthesizedProgram> {
    require_examples(examples, "parseCurrency")?;
    let convention = detect_currency_convention(examples);
    let pattern = match convention {
        CurrencyConvention::SwissApostrophe => r"[\$€£¥]?\s*([\d']+(?:\.\d+)?)",
        CurrencyConvention::European => r"[\$€£¥]?\s*([\d\.]+(?:,\d+)?)",
        CurrencyConvention::UsStandard => r"[\$€£¥]?\s*([\d,]+(?:\.\d+)?)",
    };
    let expr = ExtractorExpr::Match {
        pattern: pattern.to_string(),
        group: 1,
    };
    let normalize = |raw: &str| -> Option<f64> {
        let cleaned: String = match convention {
            CurrencyConvention::SwissApostrophe => raw.replace('\'', ""),
            CurrencyConvention::European => raw.replace('.', "").replace(',', "."),
            CurrencyConvention::UsStandard => raw.replace(',', ""),
        };
        cleaned.parse().ok()
    };
    let verifies = examples.iter().all(|e| {
        let Literal::Number(expected) = &e.output else {
            return false;
        };
        match extractor_dsl::eval(&expr, &e.input) {
            extractor_dsl::ExtractorValue::Str(raw) => normalize(&raw)
                .map(|n| (n - expected).abs() <= 0.01)
                .unwrap_or(false),
            _ => false,
        }
    });
    if verifies {
        Ok(SynthesizedProgram {
            expr,
            source: format!("parseCurrency/{convention:?}"),
            strategy: "currency",
        })
    } else {
        fall_back_to_relational(examples, "parseCurrency")
    }
}

#[derive(Debug, Clone, Copy)]
enum CurrencyConvention {
    UsStandard,
    European,
    SwissApostrophe,
}

fn detect_currency_convention(examples: &[Example]) -> CurrencyConvention {
    if examples.iter().any(|e| e.input.contains('\'')) {
        CurrencyConvention::SwissApostrophe
    } else if examples
        .iter()
        .any(|e| e.input.contains(',') && e.input.find(',').unwrap() > e.input.find('.').unwrap_or(usize::MAX))
    {
        CurrencyConvention::European
    } else {
        CurrencyConvention::UsStandard
    }
}

/// *Date parser* — detects month-name, slash, dash, or dotted forms,
/// infers two-digit year roll-over (`<=50` -> 2000s, `>50` -> 1900s), and
/// emits an extractor yielding ISO dates, verified by exact equality.
pub fn synthesize_date(examples: &[Example]) -> NucleusResult<SynthesizedProgram> {
    require_examples(examples, "parseDate")?;
    let form = detect_date_form(examples);
    let parse_one = |input: &str| -> Option<String> { parse_date_by_form(input, form) };
    let verifies = examples.iter().all(|e| {
        let Literal::String(expected) = &e.output else {
            return false;
        };
        parse_one(&e.input).as_deref() == Some(expected.as_str())
    });
    if verifies {
        Ok(SynthesizedProgram {
            expr: ExtractorExpr::Match {
                pattern: date_form_pattern(form).to_string(),
                group: 0,
            },
            source: format!("parseDate/{form:?}"),
            strategy: "date",
        })
    } else {
        fall_back_to_relational(examples, "parseDate")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DateForm {
    SlashDmy,
    DashYmd,
    DottedDmy,
}

fn date_form_pattern(form: DateForm) -> &'static str {
    match form {
        DateForm::SlashDmy => r"\d{1,2}/\d{1,2}/\d{2,4}",
        DateForm::DashYmd => r"\d{4}-\d{1,2}-\d{1,2}",
        DateForm::DottedDmy => r"\d{1,2}\.\d{1,2}\.\d{2,4}",
    }
}

fn detect_date_form(examples: &[Example]) -> DateForm {
    let sample = &examples[0].input;
    if sample.contains('/') {
        DateForm::SlashDmy
    } else if sample.contains('.') {
        DateForm::DottedDmy
    } else {
        DateForm::DashYmd
    }
}

fn parse_date_by_form(input: &str, form: DateForm) -> Option<String> {
    let sep = match form {
        DateForm::SlashDmy => '/',
        DateForm::DottedDmy => '.',
        DateForm::DashYmd => '-',
    };
    let parts: Vec<&str> = input.trim().split(sep).collect();
    if parts.len() != 3 {
        return None;
    }
    let (day, month, year) = match form {
        DateForm::DashYmd => (
            parts[2].parse::<u32>().ok()?,
            parts[1].parse::<u32>().ok()?,
            parts[0].parse::<i32>().ok()?,
        ),
        _ => (
            parts[0].parse::<u32>().ok()?,
            parts[1].parse::<u32>().ok()?,
            parts[2].parse::<i32>().ok()?,
        ),
    };
    let year = if year < 100 {
        if year <= 50 {
            2000 + year
        } else {
            1900 + year
        }
    } else {
        year
    };
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

/// *Number parser* — percentage, thousands-separated, or plain decimal.
pub fn synthesize_number(examples: &[Example]) -> NucleusResult<SynthesizedProgram> {
    require_examples(examples, "parseNumber")?;
    let is_percentage = examples.iter().any(|e| e.input.contains('%'));
    let pattern = if is_percentage {
        r"([\d\.]+)\s*%"
    } else {
        r"([\d,]+(?:\.\d+)?)"
    };
    let expr = ExtractorExpr::Match {
        pattern: pattern.to_string(),
        group: 1,
    };
    let verifies = examples.iter().all(|e| {
        let Literal::Number(expected) = &e.output else {
            return false;
        };
        match extractor_dsl::eval(&expr, &e.input) {
            extractor_dsl::ExtractorValue::Str(raw) => {
                let cleaned = raw.replace(',', "");
                let mut n: f64 = cleaned.parse().unwrap_or(f64::NAN);
                if is_percentage {
                    n /= 100.0;
                }
                (n - expected).abs() <= 0.01
            }
            _ => false,
        }
    });
    if verifies {
        Ok(SynthesizedProgram {
            expr,
            source: "parseNumber".into(),
            strategy: "number",
        })
    } else {
        fall_back_to_relational(examples, "parseNumber")
    }
}

/// *Predicate* — ranks distinguishing regular structures between true-
/// and false-labelled examples; the longest, most specific pattern wins.
pub fn synthesize_predicate(examples: &[Example]) -> NucleusResult<SynthesizedProgram> {
    let (trues, falses): (Vec<&Example>, Vec<&Example>) =
        examples.iter().partition(|e| e.is_true_output());
    if trues.is_empty() || falses.is_empty() {
        return Err(NucleusError::InsufficientExamples(
            "predicate synthesis requires at least one true and one false example".into(),
        ));
    }

    let mut candidates: Vec<String> = Vec::new();
    // (i) bracket patterns `[WORD]` shared by every true example.
    for e in &trues {
        if let Some(bracket) = extract_bracket(&e.input) {
            candidates.push(regex::escape(&bracket));
        }
    }
    // (ii) single words shared by every true example.
    if let Some(shared) = shared_words(&trues) {
        candidates.extend(shared.into_iter().map(|w| regex::escape(&w)));
    }
    // (iii) prefix-of-form `WORD:`.
    for e in &trues {
        if let Some(prefix) = e.input.split(':').next() {
            if prefix.len() < e.input.len() {
                candidates.push(format!("^{}:", regex::escape(prefix)));
            }
        }
    }
    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));
    candidates.dedup();

    for candidate in candidates {
        let Ok(re) = regex::Regex::new(&candidate) else {
            continue;
        };
        let true_ok = trues.iter().all(|e| re.is_match(&e.input));
        let false_ok = falses.iter().all(|e| !re.is_match(&e.input));
        if true_ok && false_ok {
            return Ok(SynthesizedProgram {
                expr: ExtractorExpr::Match {
                    pattern: candidate.clone(),
                    group: 0,
                },
                source: format!("predicate matches /{candidate}/"),
                strategy: "predicate",
            });
        }
    }

    // (iv) disjunction of per-example markers whose union covers every
    // true example and no false example.
    let markers: Vec<String> = trues
        .iter()
        .filter_map(|e| extract_bracket(&e.input).or_else(|| e.input.split_whitespace().next().map(str::to_string)))
        .map(|m| regex::escape(&m))
        .collect();
    if !markers.is_empty() {
        let union = markers.join("|");
        if let Ok(re) = regex::Regex::new(&union) {
            let true_ok = trues.iter().all(|e| re.is_match(&e.input));
            let false_ok = falses.iter().all(|e| !re.is_match(&e.input));
            if true_ok && false_ok {
                return Ok(SynthesizedProgram {
                    expr: ExtractorExpr::Match {
                        pattern: union.clone(),
                        group: 0,
                    },
                    source: format!("predicate matches /{union}/"),
                    strategy: "predicate",
                });
            }
        }
    }

    Err(NucleusError::SynthesisFailed {
        reason: "no distinguishing pattern separates true from false examples".into(),
        attempts: 4,
        strategies_tried: 1,
    })
}

fn extract_bracket(input: &str) -> Option<String> {
    let start = input.find('[')?;
    let end = input[start..].find(']')? + start;
    Some(input[start..=end].to_string())
}

fn shared_words<'a>(examples: &[&'a Example]) -> Option<Vec<String>> {
    let mut iter = examples.iter();
    let first: std::collections::HashSet<&str> = iter.next()?.input.split_whitespace().collect();
    let shared = iter.fold(first, |acc, e| {
        let words: std::collections::HashSet<&str> = e.input.split_whitespace().collect();
        acc.intersection(&words).copied().collect()
    });
    if shared.is_empty() {
        None
    } else {
        Some(shared.into_iter().map(str::to_string).collect())
    }
}

/// *Extractor (input -> output)* — explores the closed DSL via backward
/// search; the knowledge-base consultation happens at the call site
/// (`eval::builtins`) before this is invoked, per §4.5.2.
pub fn synthesize_extractor(examples: &[Example]) -> NucleusResult<SynthesizedProgram> {
    require_examples(examples, "extract")?;
    let pairs = examples_as_string_pairs(examples);
    let expected_numeric = matches!(examples[0].output, Literal::Number(_));
    match extractor_dsl::search(&pairs, expected_numeric, 2) {
        Some(expr) => Ok(SynthesizedProgram {
            expr,
            source: "synthesized extractor".into(),
            strategy: "extractor",
        }),
        None => Err(NucleusError::SynthesisFailed {
            reason: "no extractor in the closed DSL verifies every example".into(),
            attempts: 1,
            strategies_tried: 1,
        }),
    }
}

/// *Classifier (multi-class)* — groups examples by output, finds a common
/// pattern per group, and emits a rule list evaluated in declaration
/// order, returning the first matching output or `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierRule {
    pub pattern: String,
    pub output: Literal,
}

pub fn synthesize_classifier(examples: &[Example]) -> NucleusResult<Vec<ClassifierRule>> {
    require_examples(examples, "classify")?;
    let mut groups: Vec<(Literal, Vec<&Example>)> = Vec::new();
    for e in examples {
        if let Some(group) = groups.iter_mut().find(|(out, _)| *out == e.output) {
            group.1.push(e);
        } else {
            groups.push((e.output.clone(), vec![e]));
        }
    }

    let mut rules = Vec::new();
    for (output, members) in groups {
        let refs: Vec<&Example> = members;
        let pattern = shared_words(&refs)
            .and_then(|words| words.into_iter().next())
            .map(|w| regex::escape(&w))
            .or_else(|| extract_bracket(&refs[0].input).map(|b| regex::escape(&b)))
            .ok_or_else(|| {
                NucleusError::SynthesisFailed {
                    reason: format!("no common pattern found for output {output}"),
                    attempts: 1,
                    strategies_tried: 1,
                }
            })?;
        rules.push(ClassifierRule { pattern, output });
    }
    Ok(rules)
}

fn require_examples(examples: &[Example], operation: &str) -> NucleusResult<()> {
    if examples.is_empty() {
        Err(NucleusError::InsufficientExamples(format!(
            "'{operation}' requires at least one example"
        )))
    } else {
        Ok(())
    }
}

fn fall_back_to_relational(examples: &[Example], operation: &str) -> NucleusResult<SynthesizedProgram> {
    let pairs = examples_as_string_pairs(examples);
    let expected_numeric = matches!(examples[0].output, Literal::Number(_));
    match extractor_dsl::search(&pairs, expected_numeric, 2) {
        Some(expr) => Ok(SynthesizedProgram {
            expr,
            source: format!("{operation} (relational fallback)"),
            strategy: "relational-fallback",
        }),
        None => Err(NucleusError::SynthesisFailed {
            reason: format!("no deterministic or relational program verifies every example for '{operation}'"),
            attempts: 2,
            strategies_tried: 2,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_us_standard_parses_and_verifies() {
        let examples = vec![
            Example::new("$1,500,000", Literal::Number(1_500_000.0)),
            Example::new("$2,300,000", Literal::Number(2_300_000.0)),
        ];
        let program = synthesize_currency(&examples).unwrap();
        assert_eq!(program.strategy, "currency");
    }

    #[test]
    fn date_slash_form_with_two_digit_year_rollover() {
        let examples = vec![
            Example::new("15/01/24", Literal::String("2024-01-15".into())),
            Example::new("20/02/24", Literal::String("2024-02-20".into())),
        ];
        let program = synthesize_date(&examples).unwrap();
        assert_eq!(program.strategy, "date");
        assert_eq!(
            parse_date_by_form("25/12/24", DateForm::SlashDmy),
            Some("2024-12-25".to_string())
        );
    }

    #[test]
    fn predicate_rebuilds_bracket_tag_classifier() {
        let examples = vec![
            Example::new("[ERROR] Connection failed", Literal::Boolean(true)),
            Example::new("[ERROR] Timeout", Literal::Boolean(true)),
            Example::new("[INFO] Started", Literal::Boolean(false)),
            Example::new("[DEBUG] trace", Literal::Boolean(false)),
        ];
        let program = synthesize_predicate(&examples).unwrap();
        let matches = |s: &str| matches!(extractor_dsl::eval(&program.expr, s), extractor_dsl::ExtractorValue::Str(_));
        assert!(matches("[ERROR] Disk full"));
        assert!(!matches("[INFO] Stopped"));
    }

    #[test]
    fn predicate_with_no_true_examples_is_insufficient() {
        let examples = vec![Example::new("x", Literal::Boolean(false))];
        assert!(matches!(
            synthesize_predicate(&examples),
            Err(NucleusError::InsufficientExamples(_))
        ));
    }

    #[test]
    fn classifier_builds_one_rule_per_output_group() {
        let examples = vec![
            Example::new("red apple", Literal::String("fruit".into())),
            Example::new("red cherry", Literal::String("fruit".into())),
            Example::new("red brick", Literal::String("material".into())),
        ];
        let rules = synthesize_classifier(&examples).unwrap();
        assert_eq!(rules.len(), 2);
    }
}
