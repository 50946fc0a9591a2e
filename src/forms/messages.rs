//! User-facing Arabic strings for the intake conversation.
//!
//! Log lines stay English; everything sent through the chat transport
//! comes from here so the wording lives in one place.

pub(crate) const BACK: &str = "◀️ السابق";
pub(crate) const SKIP: &str = "⏭️ تخطي";
pub(crate) const DONE: &str = "✅ تم";
pub(crate) const MAIN_MENU: &str = "🏠 القائمة الرئيسية";
pub(crate) const CONFIRM_SUBMISSION: &str = "✅ تأكيد الإرسال";
pub(crate) const EDIT_ANSWERS: &str = "✏️ تعديل البيانات";
pub(crate) const SWITCH_YES: &str = "✅ نعم";
pub(crate) const SWITCH_NO: &str = "❌ لا";
pub(crate) const SHARE_LOCATION: &str = "📍 مشاركة الموقع";
pub(crate) const MERIDIEM_AM: &str = "🌅 صباحًا";
pub(crate) const MERIDIEM_PM: &str = "🌇 مساءً";

pub(crate) const CANNOT_GO_BACK: &str = "لا يمكن الرجوع أكثر من ذلك.";
pub(crate) const CANNOT_SKIP_REQUIRED: &str = "لا يمكن تخطي هذا الحقل لأنه مطلوب.";
pub(crate) const PROGRESS_SAVED: &str = "تم حفظ تقدمك. يمكنك العودة لاحقاً لإكمال النموذج.";
pub(crate) const NETWORK_FAILURE: &str = "خطأ في الشبكة. يرجى المحاولة لاحقاً";
pub(crate) const SUBMISSION_FAILED: &str = "تعذر إرسال الطلب. يرجى المحاولة مرة أخرى.";
pub(crate) const SESSION_ENDED: &str = "انتهت هذه الجلسة. ابدأ طلباً جديداً من القائمة الرئيسية.";
pub(crate) const UPLOAD_EXPECTED: &str = "يرجى إرسال ملف لهذا الحقل.";
pub(crate) const LOCATION_EXPECTED: &str = "يرجى مشاركة الموقع لهذا الحقل.";
pub(crate) const TEXT_EXPECTED: &str = "يرجى إدخال قيمة نصية لهذا الحقل.";
pub(crate) const ASK_MERIDIEM: &str = "هل تقصد صباحًا أم مساءً؟";
pub(crate) const CHOOSE_FIELD_TO_EDIT: &str = "اختر الحقل الذي تريد تعديله:";
pub(crate) const SUMMARY_TITLE: &str = "🎉 تم إكمال النموذج!";
pub(crate) const ETA_UNKNOWN: &str = "غير محدد";

pub(crate) fn field_skipped(name: &str) -> String {
    format!("تم تخطي حقل {name}")
}

pub(crate) fn submission_accepted(request_number: &str) -> String {
    format!("✅ تم إرسال طلبك بنجاح.\nرقم الطلب: {request_number}")
}

pub(crate) fn upload_accepted(count: usize) -> String {
    format!("✅ تم رفع {count} ملف")
}

pub(crate) fn selection_state(names: &[&str]) -> String {
    if names.is_empty() {
        "لم يتم اختيار أي خيار بعد.".to_string()
    } else {
        format!("الاختيارات الحالية: {}", names.join("، "))
    }
}

pub(crate) fn progress_line(percentage: f64, remaining: usize, eta: &str) -> String {
    let mut line = format!("📊 التقدم: {percentage:.1}%\n📝 الحقول المتبقية: {remaining}");
    if eta != ETA_UNKNOWN {
        line.push_str(&format!("\n⏱️ الوقت المتوقع: {eta}"));
    }
    line
}

pub(crate) fn eta_seconds(seconds: i64) -> String {
    format!("{seconds} ثانية")
}

pub(crate) fn eta_minutes(minutes: i64) -> String {
    format!("{minutes} دقيقة")
}

pub(crate) fn eta_hours(hours: i64) -> String {
    format!("{hours} ساعة")
}
