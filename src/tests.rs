use std::sync::Arc;

use hgd_core::ff::{RuleFeatures, WordPenalty};

use super::*;

const PHRASES: &str = "\
[X] ||| a ||| A ||| -1 ||| 0-0
[X] ||| b ||| B ||| -1 ||| 0-0
[X] ||| b ||| BB ||| -2 ||| 0-0
[X] ||| c ||| C ||| -1 ||| 0-0
";

const GLUE: &str = "\
[GOAL] ||| [X,1] ||| [X,1] ||| 0
[GOAL] ||| [GOAL,1] [X,2] ||| [GOAL,1] [X,2] ||| 0
";

fn table(vocab: &Vocabulary, owner: &str, text: &str) -> Arc<dyn Grammar> {
    Arc::new(RuleTable::from_text(owner, text, vocab).unwrap())
}

fn decoder() -> Arc<Decoder> {
    let vocab = Arc::new(Vocabulary::new());
    let grammars = vec![
        table(&vocab, "pt", PHRASES),
        table(&vocab, "glue", GLUE),
    ];
    let registry = FeatureRegistry::new()
        .with(Arc::new(RuleFeatures))
        .with(Arc::new(WordPenalty::new(&vocab)));
    let weights = Weights::new()
        .with("tm_pt_0", 1.0)
        .with("tm_glue_0", 1.0)
        .with("WordPenalty", -0.1);
    Arc::new(Decoder::new(vocab, grammars, registry, weights).unwrap())
}

#[test]
fn decode_glues_phrases() {
    let d = decoder();
    let t = d.decode(&d.sentence(0, "a b c")).unwrap();
    assert_eq!(t.output, "A B C");
    assert_eq!(t.alignments, vec![vec![0], vec![1], vec![2]]);
    let expected = -3.0 + 0.1 * 3.0 / std::f64::consts::LN_10;
    assert!((t.score - expected).abs() < 1e-9, "score {}", t.score);
}

#[test]
fn untranslatable_sentence_falls_back() {
    let d = decoder();
    let t = d.decode(&d.sentence(3, "a zz")).unwrap();
    assert_eq!(t.sentence_id, 3);
    assert_eq!(t.output, "a zz");
    assert!(t.features.is_empty());
}

#[test]
fn nbest_lists_alternatives() {
    let d = decoder();
    let list = d.decode_nbest(&d.sentence(0, "a b"), 5).unwrap();
    let outputs: Vec<&str> = list.iter().map(|t| t.output.as_str()).collect();
    assert_eq!(outputs, vec!["A B", "A BB"]);
    assert!(list[0].score >= list[1].score);
}

#[test]
fn nbest_size_comes_from_settings() {
    let d = decoder();
    let sentence = d.sentence(0, "a b");
    let list = d.decode_nbest_default(&sentence).unwrap();
    assert_eq!(list.len(), d.settings().output.nbest);
    assert_eq!(list[0].output, "A B");

    let mut settings = d.settings().clone();
    settings.output.nbest = 2;
    let vocab = Arc::new(Vocabulary::new());
    let wide = Decoder::new(
        Arc::clone(&vocab),
        vec![table(&vocab, "pt", PHRASES), table(&vocab, "glue", GLUE)],
        FeatureRegistry::new().with(Arc::new(RuleFeatures)),
        Weights::new().with("tm_pt_0", 1.0),
    )
    .unwrap()
    .with_settings(settings);
    let outputs: Vec<String> = wide
        .decode_nbest_default(&wide.sentence(0, "a b"))
        .unwrap()
        .into_iter()
        .map(|t| t.output)
        .collect();
    assert_eq!(outputs, vec!["A B", "A BB"]);
}

#[test]
fn batch_keeps_input_order() {
    let d = decoder();
    let texts = ["a", "b c", "c a b", "zz", "a b c", "b", "c c", "a a a"];
    let sentences: Vec<Sentence> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| d.sentence(i, t))
        .collect();
    let sequential: Vec<String> = sentences
        .iter()
        .map(|s| d.decode(s).unwrap().output)
        .collect();

    let batch = d.decode_batch(sentences, 3);
    assert_eq!(batch.len(), texts.len());
    for (i, (r, expected)) in batch.into_iter().zip(&sequential).enumerate() {
        let t = r.unwrap();
        assert_eq!(t.sentence_id, i);
        assert_eq!(&t.output, expected);
    }
}

#[test]
fn batch_with_zero_threads_uses_one_worker() {
    let d = decoder();
    let batch = d.decode_batch(vec![d.sentence(0, "c b")], 0);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].as_ref().unwrap().output, "C B");
}

#[test]
fn empty_batch() {
    let d = decoder();
    assert!(d.decode_batch(Vec::new(), 4).is_empty());
}

#[test]
fn explain_serializes() {
    let d = decoder();
    let explanation = d.explain(&d.sentence(0, "a b"));
    let json = serde_json::to_value(&explanation).unwrap();
    assert_eq!(json["source"], "a b");
    assert!(json["derivation"].is_object());
}

#[test]
fn settings_override_is_per_decoder() {
    let d = decoder();
    let mut settings = d.settings().clone();
    settings.search.goal_symbol = "NOPE".to_string();
    let vocab = Arc::new(Vocabulary::new());
    let strict = Decoder::new(
        Arc::clone(&vocab),
        vec![table(&vocab, "pt", PHRASES), table(&vocab, "glue", GLUE)],
        FeatureRegistry::new().with(Arc::new(RuleFeatures)),
        Weights::new(),
    )
    .unwrap()
    .with_settings(settings);

    assert_eq!(strict.decode(&strict.sentence(0, "a")).unwrap().output, "a");
    assert_eq!(d.decode(&d.sentence(0, "a")).unwrap().output, "A");
}

#[test]
fn unary_cycle_is_rejected() {
    let vocab = Arc::new(Vocabulary::new());
    let first = table(&vocab, "one", "[X] ||| [Y,1] ||| [Y,1] ||| 0\n");
    let second = table(&vocab, "two", "[Y] ||| [X,1] ||| [X,1] ||| 0\n");
    let err = Decoder::new(vocab, vec![first, second], FeatureRegistry::new(), Weights::new())
        .unwrap_err();
    assert!(matches!(err, DecodeError::Grammar(_)), "{err}");
}
