use std::path::Path;

use burn::backend::NdArray;
use pretty_assertions::assert_eq;
use segment_bert::{
    hub::{checkpoint, Features, LocalCache, SegmentBertHub},
    models::{
        segment_bert::heads::{HeadKind, HeadShape, DEPENDENCY_PARSE_HEAD},
        ArchitectureArgs,
    },
    tasks::{Dictionary, SegmentTask},
    Error,
};

type TestBackend = NdArray;

fn task() -> SegmentTask {
    SegmentTask::new(
        HeadKind::DependencyParse,
        Dictionary::from_symbols(["나", "는", "학교", "에", "간다"]),
        Dictionary::from_symbols(["NP", "JX", "NNG", "JKB", "VV"]),
    )
    .with_labels(
        Dictionary::from_symbols(["1", "2", "3", "4", "5", "6"]),
        Dictionary::from_symbols(["NP_SBJ", "NP_AJT", "VP"]),
    )
}

fn tiny_args() -> ArchitectureArgs {
    ArchitectureArgs {
        encoder_layers: Some(2),
        encoder_embed_dim: Some(8),
        encoder_ffn_embed_dim: Some(16),
        encoder_attention_heads: Some(2),
        max_positions: Some(16),
        task: Some(HeadKind::DependencyParse.to_string()),
        ..Default::default()
    }
}

async fn write_checkpoint(dir: &Path) {
    let task = task();
    let mut model = task
        .build_model::<TestBackend>(&tiny_args(), &Default::default())
        .unwrap();
    model.register_classification_head("sentiment", 2, Some(4));

    checkpoint::save(dir, &task, &model).await.unwrap();
}

async fn hub(dir: &Path) -> SegmentBertHub<TestBackend> {
    SegmentBertHub::<TestBackend>::from_pretrained(dir, Default::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn checkpoints_keep_every_registered_head() {
    let _ = pretty_env_logger::try_init();
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path()).await;

    let hub = hub(dir.path()).await;
    let heads = &hub.model.classification_heads;

    assert_eq!(heads.len(), 2);
    assert_eq!(
        heads.head("sentiment").unwrap().shape(),
        HeadShape {
            num_classes: 2,
            inner_dim: 4
        }
    );
    let parser = heads.dependency_parse(DEPENDENCY_PARSE_HEAD).unwrap();
    assert_eq!(parser.num_governors(), 6);
    assert_eq!(parser.num_classes(), 3);
    assert_eq!(hub.model.num_layers(), 2);
    assert_eq!(hub.model.max_positions(), 16);
}

#[tokio::test]
async fn undeclared_checkpoint_heads_take_the_default_shape() {
    let dir = tempfile::tempdir().unwrap();

    let task = task();
    let mut model = task
        .build_model::<TestBackend>(&tiny_args(), &Default::default())
        .unwrap();
    model.register_classification_head("legacy", 48, Some(768));
    checkpoint::save(dir.path(), &task, &model).await.unwrap();

    // Forget which heads were declared
    let args_path = dir.path().join(checkpoint::ARGS_FILE);
    let mut args: checkpoint::CheckpointArgs =
        serde_json::from_slice(&tokio::fs::read(&args_path).await.unwrap()).unwrap();
    args.heads.clear();
    tokio::fs::write(&args_path, serde_json::to_vec(&args).unwrap())
        .await
        .unwrap();

    let hub = hub(dir.path()).await;

    assert_eq!(
        hub.model.classification_heads.head("legacy").unwrap().shape(),
        HeadShape {
            num_classes: 48,
            inner_dim: 768
        }
    );
}

#[tokio::test]
async fn pruned_checkpoints_load_the_kept_layers() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path()).await;

    let (_, model) = checkpoint::load::<TestBackend>(
        dir.path(),
        |args| args.encoder_layers_to_keep = Some("1".to_string()),
        &Default::default(),
    )
    .await
    .unwrap();

    assert_eq!(model.num_layers(), 1);
    // Heads are only loaded on request
    assert_eq!(model.classification_heads.len(), 1);
}

#[tokio::test]
async fn predicts_a_governor_and_label_per_token() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path()).await;
    let hub = hub(dir.path()).await;

    let (governors, labels) = hub
        .predict_dependency(&["나", "는", "학교", "에", "간다"], &["NP", "JX", "NNG", "JKB", "VV"])
        .unwrap();

    assert_eq!(governors.len(), 5);
    assert_eq!(labels.len(), 5);
    for governor in governors {
        assert!(
            ["1", "2", "3", "4", "5", "6"].contains(&governor.as_str()),
            "{governor}"
        );
    }
    for label in labels {
        assert!(["NP_SBJ", "NP_AJT", "VP"].contains(&label.as_str()), "{label}");
    }
}

#[tokio::test]
async fn governors_decode_to_label_symbols_for_sentences_longer_than_the_label_set() {
    let dir = tempfile::tempdir().unwrap();

    let base = task();
    let task = SegmentTask::new(
        HeadKind::DependencyParse,
        base.source_dictionary,
        base.pos_dictionary,
    )
    .with_labels(
        Dictionary::from_symbols(["0", "1"]),
        Dictionary::from_symbols(["NP_SBJ", "VP"]),
    );
    let model = task
        .build_model::<TestBackend>(&tiny_args(), &Default::default())
        .unwrap();
    checkpoint::save(dir.path(), &task, &model).await.unwrap();

    let hub = hub(dir.path()).await;
    let tokens = ["나", "는", "학교", "에", "간다", "나", "는", "간다"];
    let segments = ["NP", "JX", "NNG", "JKB", "VV", "NP", "JX", "VV"];

    let (governors, labels) = hub.predict_dependency(&tokens, &segments).unwrap();

    assert_eq!(governors.len(), 8);
    assert_eq!(labels.len(), 8);
    for governor in governors {
        assert!(["0", "1"].contains(&governor.as_str()), "{governor}");
    }
}

#[tokio::test]
async fn rejects_sentences_longer_than_max_positions() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path()).await;
    let hub = hub(dir.path()).await;

    let tokens = vec!["학교"; 15];
    let err = hub.predict_dependency(tokens.as_slice(), tokens.as_slice()).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::SequenceTooLong { len: 17, max: 16 })
    ));

    let err = hub.extract_features(&[0; 17], &[0; 17], false).unwrap_err();
    assert_eq!(err.to_string(), "tokens exceeds maximum length: 17 > 16");
}

#[tokio::test]
async fn encodes_and_decodes_sentences() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path()).await;
    let hub = hub(dir.path()).await;
    let dictionary = &hub.task.source_dictionary;

    assert_eq!(hub.tokenize("나 는  간다", true).unwrap(), "<s> 나 는 간다 </s>");

    let ids = hub.encode("나 는", &["학교 에"], true, false).unwrap();
    assert_eq!(
        dictionary.string(&ids, false),
        "<s> 나 는 </s> </s> 학교 에 </s>"
    );

    let ids = hub.encode("나 는", &["학교 에"], true, true).unwrap();
    assert_eq!(dictionary.string(&ids, false), "<s> 나 는 </s> 학교 에 </s>");

    let ids = hub.encode("나 는", &["모르는"], false, false).unwrap();
    assert_eq!(dictionary.string(&ids, false), "나 는 <unk>");

    // Auxiliary sentences survive without special tokens, whatever the separator flag
    let ids = hub.encode("나 는", &["학교 에", "간다"], false, true).unwrap();
    assert_eq!(dictionary.string(&ids, false), "나 는 학교 에 간다");

    let ids = hub.encode("나 는", &["학교 에"], true, false).unwrap();
    assert_eq!(hub.decode(&ids).unwrap(), vec!["나 는", "학교 에"]);
}

#[tokio::test]
async fn extracts_features_and_predicts_classes() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path()).await;
    let hub = hub(dir.path()).await;

    let tokens = hub.encode("나 는 학교 에 간다", &[], true, false).unwrap();
    let segments = vec![0, 4, 5, 6, 7, 8, 2];

    match hub.extract_features(&tokens, &segments, false).unwrap() {
        Features::Last(features) => assert_eq!(features.dims(), [1, 7, 8]),
        Features::All(_) => panic!("expected the last layer only"),
    }
    match hub.extract_features(&tokens, &segments, true).unwrap() {
        Features::All(states) => assert_eq!(states.len(), 3),
        Features::Last(_) => panic!("expected every layer"),
    }

    let log_probs = hub.predict("sentiment", &tokens, &segments, false).unwrap();
    assert_eq!(log_probs.dims(), [1, 2]);
    let total = log_probs.exp().sum().into_scalar();
    assert!((total - 1.0).abs() < 1e-4, "probabilities sum to {total}");

    let err = hub.predict("topic", &tokens, &segments, true).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnknownHead(_))));
}

#[tokio::test]
async fn loads_through_a_resolver() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("ko").join("brainbert.base.ko.dp");
    write_checkpoint(&dir).await;

    let cache = LocalCache::new(root.path().to_path_buf());
    let hub = SegmentBertHub::<TestBackend>::load_model(
        "brainbert.base.ko.dp",
        "ko",
        &cache,
        Default::default(),
    )
    .await
    .unwrap();

    assert_eq!(hub.task.kind, HeadKind::DependencyParse);
}
