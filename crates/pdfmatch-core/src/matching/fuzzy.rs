use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::{MatchState, PdfCandidate, calibrate};
use crate::config::{MatcherConfig, SignalWeights, TitleBlend};
use crate::manifest::ArticleRecord;
use crate::report::{ComponentScores, Confidence, EffectiveThresholds, MatchMethod, MatchWarning, UnmatchedReason};
use crate::similarity::{
    author_similarity, filename_has_digits, filename_has_keywords, filename_keyword_overlap,
    pages_in_filename, title_similarity_with,
};

/// Combined fuzzy score of one article/PDF pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub score: f64,
    pub components: ComponentScores,
}

fn max_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |best, v| Some(best.map_or(v, |b: f64| b.max(v))))
}

/// Scores a pair from the signals both sides can provide. Weights of
/// unavailable signals are dropped and the rest rescaled to sum to one.
pub fn score_pair(
    article: &ArticleRecord,
    pdf: &PdfCandidate,
    weights: &SignalWeights,
    blend: &TitleBlend,
) -> PairScore {
    let meta = &pdf.metadata;

    let title = match meta.title.as_deref() {
        Some(pdf_title) => max_of(article.titles().map(|t| title_similarity_with(pdf_title, t, blend))),
        None => None,
    };

    let authors = if meta.authors.is_empty() {
        None
    } else {
        max_of(
            article
                .author_surnames
                .both()
                .into_iter()
                .filter(|surnames| !surnames.is_empty())
                .map(|surnames| author_similarity(&meta.authors, surnames)),
        )
    };

    let pages = article
        .pages
        .filter(|_| filename_has_digits(&pdf.filename))
        .map(|range| if pages_in_filename(&pdf.filename, &range) { 1.0 } else { 0.0 });

    let filename = if filename_has_keywords(&pdf.filename) {
        max_of(article.titles().map(|t| filename_keyword_overlap(&pdf.filename, t)))
    } else {
        None
    };

    let components = ComponentScores {
        title,
        authors,
        pages,
        filename,
    };
    let signals = [
        (weights.title, title),
        (weights.authors, authors),
        (weights.pages, pages),
        (weights.filename, filename),
    ];
    let total: f64 = signals
        .iter()
        .filter(|(_, s)| s.is_some())
        .map(|(w, _)| *w)
        .sum();
    let score = if total > 0.0 {
        let weighted: f64 = signals
            .iter()
            .filter_map(|(w, s)| s.map(|s| w * s))
            .sum();
        (weighted / total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    PairScore { score, components }
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    article: usize,
    pdf: usize,
    pair: PairScore,
}

fn by_score_desc(a: &Scored, b: &Scored) -> Ordering {
    b.pair
        .score
        .total_cmp(&a.pair.score)
        .then(a.article.cmp(&b.article))
        .then(a.pdf.cmp(&b.pdf))
}

fn component_details(pair: &PairScore) -> Vec<String> {
    let c = &pair.components;
    [
        ("title", c.title),
        ("authors", c.authors),
        ("pages", c.pages),
        ("filename", c.filename),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|v| format!("{name}={v:.3}")))
    .collect()
}

/// Phase 2 over the articles and PDFs the identifier phases left free.
/// Returns the thresholds used for confidence tiers.
pub(crate) fn match_fuzzy(
    articles: &[ArticleRecord],
    pdfs: &[PdfCandidate],
    config: &MatcherConfig,
    state: &mut MatchState,
) -> EffectiveThresholds {
    let open_articles: Vec<usize> = (0..articles.len()).filter(|i| state.article_free(*i)).collect();
    let open_pdfs: Vec<usize> = (0..pdfs.len()).filter(|j| state.pdf_eligible(*j)).collect();
    info!(
        articles = open_articles.len(),
        pdfs = open_pdfs.len(),
        "fuzzy matching"
    );

    // Full score matrix, including pairs below the floor, for diagnostics.
    let mut all: Vec<Scored> = Vec::with_capacity(open_articles.len() * open_pdfs.len());
    for &article in &open_articles {
        for &pdf in &open_pdfs {
            let pair = score_pair(&articles[article], &pdfs[pdf], &config.weights, &config.title_blend);
            debug!(
                article,
                pdf = %pdfs[pdf].filename,
                score = pair.score,
                title = ?pair.components.title,
                authors = ?pair.components.authors,
                "scored pair"
            );
            all.push(Scored { article, pdf, pair });
        }
    }
    all.sort_by(by_score_desc);

    let best_scores: Vec<f64> = open_articles
        .iter()
        .filter_map(|a| all.iter().find(|s| s.article == *a))
        .map(|s| s.pair.score)
        .filter(|score| *score > 0.0)
        .collect();
    let thresholds = calibrate(&config.thresholds, &config.adaptive, &best_scores);

    resolve(articles, pdfs, &open_articles, &all, &thresholds, state);
    thresholds
}

/// Turns the sorted score matrix into assignments: margin deferral, greedy
/// pass, elimination, best free candidate, then unmatched reasons.
fn resolve(
    articles: &[ArticleRecord],
    pdfs: &[PdfCandidate],
    open_articles: &[usize],
    all: &[Scored],
    thresholds: &EffectiveThresholds,
    state: &mut MatchState,
) {
    let candidates: Vec<Scored> = all
        .iter()
        .copied()
        .filter(|s| s.pair.score >= thresholds.min_score)
        .collect();
    let per_article = |article: usize| candidates.iter().filter(move |s| s.article == article);

    // Margin rule.
    let mut ambiguous: BTreeSet<usize> = BTreeSet::new();
    for &article in open_articles {
        let mut list = per_article(article);
        if let (Some(best), Some(second)) = (list.next(), list.next()) {
            if best.pair.score - second.pair.score < thresholds.margin {
                debug!(
                    article,
                    best = best.pair.score,
                    second = second.pair.score,
                    "ambiguous candidates, deferring"
                );
                ambiguous.insert(article);
                state.warnings.push(MatchWarning::AmbiguousMatch {
                    article_index: article,
                    best: best.pair.score,
                    second: second.pair.score,
                });
            }
        }
    }

    // Greedy pass over unambiguous articles.
    for s in &candidates {
        if ambiguous.contains(&s.article) || !state.article_free(s.article) || !state.pdf_free(s.pdf) {
            continue;
        }
        let confidence = Confidence::from_score(s.pair.score, thresholds);
        info!(article = s.article, pdf = %pdfs[s.pdf].filename, score = s.pair.score, "fuzzy match");
        state.assign(
            &articles[s.article],
            s.pdf,
            &pdfs[s.pdf],
            s.pair.score,
            MatchMethod::Fuzzy,
            confidence,
            Some(s.pair.components),
            component_details(&s.pair),
        );
    }

    let mut deferred: Vec<(usize, f64)> = ambiguous
        .iter()
        .filter_map(|a| per_article(*a).next().map(|s| (*a, s.pair.score)))
        .collect();
    deferred.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    // Elimination: the only candidate still free.
    for &(article, _) in &deferred {
        if !state.article_free(article) {
            continue;
        }
        let free: Vec<&Scored> = per_article(article).filter(|s| state.pdf_free(s.pdf)).collect();
        if let [only] = free.as_slice() {
            let confidence = Confidence::from_score(only.pair.score, thresholds).min(Confidence::Medium);
            info!(article, pdf = %pdfs[only.pdf].filename, score = only.pair.score, "match by elimination");
            let mut details = component_details(&only.pair);
            details.push("only remaining candidate".to_string());
            state.assign(
                &articles[article],
                only.pdf,
                &pdfs[only.pdf],
                only.pair.score,
                MatchMethod::FuzzyElimination,
                confidence,
                Some(only.pair.components),
                details,
            );
        }
    }

    // Best free candidate for the rest.
    for &(article, _) in &deferred {
        if !state.article_free(article) {
            continue;
        }
        let competing: Vec<String> = per_article(article)
            .map(|s| format!("{}={:.3}", pdfs[s.pdf].filename, s.pair.score))
            .collect();
        let Some(best) = per_article(article).find(|s| state.pdf_free(s.pdf)) else {
            continue;
        };
        warn!(article, pdf = %pdfs[best.pdf].filename, score = best.pair.score, "ambiguous match, taking best free candidate");
        let mut details = component_details(&best.pair);
        details.push(format!("competing: {}", competing.join(", ")));
        state.assign(
            &articles[article],
            best.pdf,
            &pdfs[best.pdf],
            best.pair.score,
            MatchMethod::FuzzyAmbiguousBest,
            Confidence::Low,
            Some(best.pair.components),
            details,
        );
    }

    // Whatever is left stays unmatched, with the reason.
    for &article in open_articles {
        if !state.article_free(article) {
            continue;
        }
        let best_raw = all.iter().find(|s| s.article == article);
        let best_score = best_raw.map_or(0.0, |s| s.pair.score);
        let reason = if ambiguous.contains(&article) {
            UnmatchedReason::Ambiguous
        } else if best_score <= 0.0 {
            UnmatchedReason::NoCandidate
        } else {
            UnmatchedReason::LowScore
        };
        let details = best_raw
            .map(|s| vec![format!("best candidate: {} ({:.3})", pdfs[s.pdf].filename, s.pair.score)])
            .unwrap_or_default();
        warn!(article, reason = reason.as_str(), best = best_score, "article left unmatched");
        state.mark_unmatched(&articles[article], reason, best_score, details);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::types::{LangPair, PdfDocumentMetadata};

    fn config_without_calibration() -> MatcherConfig {
        let mut config = MatcherConfig::default();
        config.adaptive.enabled = false;
        config
    }

    fn scored(article: usize, pdf: usize, score: f64) -> Scored {
        Scored {
            article,
            pdf,
            pair: PairScore {
                score,
                components: ComponentScores::default(),
            },
        }
    }

    #[test]
    fn only_available_signals_count() {
        let article = article(0, Some("Экология рек бассейна Волги"));
        let pdf = pdf("doc_a.pdf", titled("ЭКОЛОГИЯ РЕК БАССЕЙНА ВОЛГИ"));
        let pair = score_pair(&article, &pdf, &SignalWeights::default(), &TitleBlend::default());
        assert_eq!(pair.components.title, Some(1.0));
        assert_eq!(pair.components.authors, None);
        assert_eq!(pair.components.pages, None);
        assert_eq!(pair.components.filename, None);
        assert!((pair.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn page_and_filename_signals_join_when_present() {
        let mut a = with_pages(article(0, Some("Routing protocols for sensor networks")), 12, 20);
        a.author_surnames = LangPair {
            ru: vec![],
            en: vec!["Ivanov".into()],
        };
        let meta = PdfDocumentMetadata {
            title: Some("Routing protocols for sensor networks".into()),
            authors: vec!["Ivanov I.I.".into()],
            ..PdfDocumentMetadata::default()
        };
        let pair = score_pair(&a, &pdf("routing_12-20.pdf", meta), &SignalWeights::default(), &TitleBlend::default());
        assert_eq!(pair.components.pages, Some(1.0));
        // A perfect surname match is worth 0.9 by construction.
        assert!((pair.components.authors.unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(pair.components.filename, Some(0.25));
        assert!((pair.score - 0.895).abs() < 1e-9, "score {}", pair.score);
    }

    #[test]
    fn no_signal_scores_zero() {
        let pair = score_pair(
            &article(0, None),
            &pdf("001.pdf", PdfDocumentMetadata::default()),
            &SignalWeights::default(),
            &TitleBlend::default(),
        );
        assert_eq!(pair.score, 0.0);
        assert_eq!(pair.components, ComponentScores::default());
    }

    #[test]
    fn candidates_sort_by_score_then_indices() {
        let mut list = vec![scored(1, 0, 0.5), scored(0, 1, 0.5), scored(0, 0, 0.9), scored(0, 0, 0.5)];
        list.sort_by(by_score_desc);
        let order: Vec<(usize, usize)> = list.iter().map(|s| (s.article, s.pdf)).collect();
        assert_eq!(order, vec![(0, 0), (0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn close_candidates_are_not_assigned_greedily() {
        // Filenames carry the only signal, so each pair's score is its keyword overlap.
        let a0 = article(0, Some("alpha beta gamma delta epsilon zeta"));
        let pdfs = vec![
            pdf("alpha_beta_gamma.pdf", PdfDocumentMetadata::default()),
            pdf("alpha_beta_gamma_delta_other.pdf", PdfDocumentMetadata::default()),
        ];
        let mut state = MatchState::new(1, 2);
        match_fuzzy(&[a0], &pdfs, &config_without_calibration(), &mut state);

        let result = state.results[0].as_ref().unwrap();
        // 0.50 vs 0.571: inside the margin, so never a plain fuzzy match.
        assert_ne!(result.method, MatchMethod::Fuzzy);
        assert!(matches!(
            state.warnings.as_slice(),
            [MatchWarning::AmbiguousMatch { article_index: 0, .. }]
        ));
        assert_eq!(result.method, MatchMethod::FuzzyAmbiguousBest);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.pdf_filename.as_deref(), Some("alpha_beta_gamma_delta_other.pdf"));
    }

    fn fixed_thresholds() -> EffectiveThresholds {
        let t = crate::config::Thresholds::default();
        EffectiveThresholds {
            min_score: t.min_score,
            medium: t.medium,
            high: t.high,
            margin: t.margin,
            calibrated: false,
            samples: 0,
        }
    }

    #[test]
    fn margin_rule_defers_half_and_half_candidates() {
        let articles = vec![article(0, Some("a")), article(1, Some("b"))];
        let pdfs = vec![
            pdf("p0.pdf", PdfDocumentMetadata::default()),
            pdf("p1.pdf", PdfDocumentMetadata::default()),
        ];
        // Article 0: 0.52 vs 0.50, gap 0.02. Article 1: a clear winner on p1.
        let mut all = vec![scored(0, 0, 0.52), scored(0, 1, 0.50), scored(1, 1, 0.90)];
        all.sort_by(by_score_desc);

        let mut state = MatchState::new(2, 2);
        resolve(&articles, &pdfs, &[0, 1], &all, &fixed_thresholds(), &mut state);

        let r1 = state.results[1].as_ref().unwrap();
        assert_eq!(r1.method, MatchMethod::Fuzzy);
        assert_eq!(r1.confidence, Confidence::High);
        assert_eq!(r1.pdf_filename.as_deref(), Some("p1.pdf"));

        let r0 = state.results[0].as_ref().unwrap();
        assert_eq!(r0.method, MatchMethod::FuzzyElimination);
        assert_eq!(r0.pdf_filename.as_deref(), Some("p0.pdf"));
        assert_eq!(r0.confidence, Confidence::Medium);
        assert!(matches!(
            state.warnings.as_slice(),
            [MatchWarning::AmbiguousMatch { article_index: 0, best, second }]
                if (*best - 0.52).abs() < 1e-12 && (*second - 0.50).abs() < 1e-12
        ));
    }

    #[test]
    fn margin_rule_without_other_claims_takes_best_with_low_confidence() {
        let articles = vec![article(0, Some("a"))];
        let pdfs = vec![
            pdf("p0.pdf", PdfDocumentMetadata::default()),
            pdf("p1.pdf", PdfDocumentMetadata::default()),
        ];
        let mut all = vec![scored(0, 1, 0.50), scored(0, 0, 0.52)];
        all.sort_by(by_score_desc);

        let mut state = MatchState::new(1, 2);
        resolve(&articles, &pdfs, &[0], &all, &fixed_thresholds(), &mut state);
        let r0 = state.results[0].as_ref().unwrap();
        assert_eq!(r0.method, MatchMethod::FuzzyAmbiguousBest);
        assert_eq!(r0.pdf_filename.as_deref(), Some("p0.pdf"));
        assert_eq!(r0.confidence, Confidence::Low);
        assert!(r0.details.iter().any(|d| d == "competing: p0.pdf=0.520, p1.pdf=0.500"));
    }

    #[test]
    fn ambiguous_article_with_claimed_candidates_stays_ambiguous() {
        let articles = vec![article(0, Some("a")), article(1, Some("b")), article(2, Some("c"))];
        let pdfs = vec![
            pdf("p0.pdf", PdfDocumentMetadata::default()),
            pdf("p1.pdf", PdfDocumentMetadata::default()),
        ];
        let mut all = vec![
            scored(0, 0, 0.52),
            scored(0, 1, 0.50),
            scored(1, 0, 0.95),
            scored(2, 1, 0.90),
        ];
        all.sort_by(by_score_desc);

        let mut state = MatchState::new(3, 2);
        resolve(&articles, &pdfs, &[0, 1, 2], &all, &fixed_thresholds(), &mut state);
        let r0 = state.results[0].as_ref().unwrap();
        assert_eq!(r0.method, MatchMethod::Unmatched);
        assert_eq!(r0.reason, Some(UnmatchedReason::Ambiguous));
    }

    #[test]
    fn every_article_finds_its_pdf() {
        let titles = ["alpha beta gamma delta", "alpha beta gamma epsilon"];
        let a0 = article(0, Some(titles[0]));
        let a1 = article(1, Some(titles[1]));
        let pdfs = vec![
            pdf("x.pdf", titled("Alpha beta gamma delta")),
            pdf("y.pdf", titled("Alpha beta gamma delta epsilon")),
        ];
        let mut state = MatchState::new(2, 2);
        match_fuzzy(&[a0, a1], &pdfs, &config_without_calibration(), &mut state);

        let methods: Vec<MatchMethod> = state
            .results
            .iter()
            .map(|r| r.as_ref().unwrap().method)
            .collect();
        assert!(methods.iter().all(|m| *m != MatchMethod::Unmatched), "{methods:?}");
        let used: BTreeSet<&str> = state
            .results
            .iter()
            .filter_map(|r| r.as_ref().unwrap().pdf_filename.as_deref())
            .collect();
        assert_eq!(used.len(), 2);
        let r0 = state.results[0].as_ref().unwrap();
        assert_eq!(r0.pdf_filename.as_deref(), Some("x.pdf"));
    }

    #[test]
    fn unmatched_reasons() {
        let low = article(0, Some("Routing protocols for sensor networks"));
        let none = article(1, None);
        let pdfs = vec![pdf("p.pdf", titled("Routing of vehicles in cities"))];
        let mut config = config_without_calibration();
        config.thresholds.min_score = 0.9;

        let mut state = MatchState::new(2, 1);
        match_fuzzy(&[low, none], &pdfs, &config, &mut state);
        let r0 = state.results[0].as_ref().unwrap();
        assert_eq!(r0.method, MatchMethod::Unmatched);
        assert_eq!(r0.reason, Some(UnmatchedReason::LowScore));
        assert!(r0.score > 0.0);
        assert!(r0.details[0].starts_with("best candidate: p.pdf"));
        let r1 = state.results[1].as_ref().unwrap();
        assert_eq!(r1.reason, Some(UnmatchedReason::NoCandidate));
    }

    #[test]
    fn rejected_pdf_never_enters_fuzzy_phase() {
        let a0 = article(0, Some("Routing protocols for sensor networks"));
        let pdfs = vec![pdf("p.pdf", titled("Routing protocols for sensor networks"))];
        let mut state = MatchState::new(1, 1);
        state.reject(0);
        match_fuzzy(&[a0], &pdfs, &config_without_calibration(), &mut state);
        let r0 = state.results[0].as_ref().unwrap();
        assert_eq!(r0.reason, Some(UnmatchedReason::NoCandidate));
        assert!(state.pdf_free(0));
    }
}
