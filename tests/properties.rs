//! Property tests for the lexer and detect mode

use proptest::prelude::*;
use token_refactor::token::tokens_to_text;
use token_refactor::{
    CLexer, CaptureRule, Lexer, MemoryWriter, Pattern, PatternDefinition, RecordingReporter,
    Rewriter, SkipCache, SourceFile,
};

fn source() -> impl Strategy<Value = String> {
    "[a-z0-9 +*;=()\n]{0,64}"
}

proptest! {
    #[test]
    fn prop_tokenize_is_lossless(src in "[a-z0-9 +*;=\n]{0,128}") {
        let tokens = CLexer::new().tokenize(&src).unwrap();
        prop_assert_eq!(tokens_to_text(&tokens), src);
    }

    #[test]
    fn prop_line_numbers_follow_newlines(src in "[a-z0-9 +*;=\n]{0,128}") {
        let tokens = CLexer::new().tokenize(&src).unwrap();
        let mut consumed = String::new();
        for token in &tokens {
            prop_assert_eq!(token.line, consumed.matches('\n').count() + 1);
            consumed.push_str(&token.text);
        }
    }

    #[test]
    fn prop_detect_mode_never_writes(src in source()) {
        let lexer = CLexer::new();
        let Ok(_) = lexer.tokenize(&src) else { return Ok(()); };
        let pattern = Pattern::compile(
            &PatternDefinition::new("assign", "<lhs> = <rhs> ;")
                .replace("<rhs> = <lhs> ;")
                .capture("lhs", CaptureRule::Ident)
                .capture("rhs", CaptureRule::Until { text: ";".into() }),
            &lexer,
        )
        .unwrap();

        let mut reporter = RecordingReporter::accepting();
        let writer = MemoryWriter::new();
        let mut handle = writer.clone();
        let mut cache = SkipCache::disabled();
        let mut file = SourceFile::new("p.php", src.clone());

        let report = Rewriter::new(&lexer, &mut reporter, &mut handle, &mut cache)
            .detect_only(true)
            .run(&pattern, &mut file)
            .unwrap();

        prop_assert_eq!(file.content, src);
        prop_assert!(writer.writes().is_empty());
        prop_assert_eq!(report.applied, 0);
        prop_assert_eq!(reporter.events.len(), report.detected);
    }
}
