//! Report panel titles.

use crucible_common::VerificationStep;

/// The panel title shown above a step's report.
pub fn report_title(step: VerificationStep) -> &'static str {
    match step {
        VerificationStep::UploadSource => "I - Edit program",
        VerificationStep::LlvmBitcodeGeneration => "II - Generate LLVM Bitcode",
        VerificationStep::SymbolicExecution => "III - Run symbolic execution",
        VerificationStep::SourceRestoration | VerificationStep::ProgramVerification => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titled_steps_are_numbered() {
        assert_eq!(report_title(VerificationStep::UploadSource), "I - Edit program");
        assert_eq!(
            report_title(VerificationStep::LlvmBitcodeGeneration),
            "II - Generate LLVM Bitcode"
        );
        assert_eq!(
            report_title(VerificationStep::SymbolicExecution),
            "III - Run symbolic execution"
        );
    }

    #[test]
    fn untitled_steps_yield_empty_strings() {
        assert_eq!(report_title(VerificationStep::SourceRestoration), "");
        assert_eq!(report_title(VerificationStep::ProgramVerification), "");
    }
}
