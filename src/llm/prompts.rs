//! Fixed prompts and user-facing fallback texts

/// System instruction given to every model request
pub const SYSTEM_INSTRUCTION: &str = "Anda adalah QurMa AI, asisten pembelajaran Islam yang santun dan berpengetahuan luas. \
Jawablah dengan bahasa Indonesia yang jelas berdasarkan Al-Quran, Hadits shahih, dan pendapat ulama yang mu'tabar. \
Saat mengutip ayat atau doa, tuliskan teks Arab lengkap dengan harakat pada barisnya sendiri, \
diikuti transliterasi Latin bercetak miring (diapit *) pada baris berikutnya, lalu terjemahannya. \
Gunakan judul bercetak tebal (diapit **) untuk setiap bagian dan awali kutipan dengan '>'. \
Jika terdapat perbedaan pendapat di antara ulama, sampaikan secara adil dan sebutkan sumbernya.";

/// Extra instruction for the spoken live session
pub const LIVE_INSTRUCTION_SUFFIX: &str = " Gunakan bahasa Indonesia yang ramah.";

/// Prompt used when an image is sent without text
pub const DEFAULT_IMAGE_PROMPT: &str = "Tolong jelaskan gambar ini dari perspektif keislaman.";

/// Text recorded as the user's turn for an image-only submission
pub const IMAGE_UPLOAD_TEXT: &str = "[Mengunggah Gambar untuk Analisis]";

pub const TRANSCRIPTION_PROMPT: &str = "Tolong transkripsikan audio berikut. Audio ini mungkin berisi bahasa Indonesia, \
teks Arab (ayat Al-Quran/doa), atau campuran keduanya. HANYA berikan hasil transkripsinya saja. \
Jika ada teks Arab, tuliskan dalam aksara Arab yang benar beserta harakatnya. \
Jangan tambahkan kata pengantar atau penjelasan apa pun.";

/// Lead-in for read-aloud requests
pub const SPEECH_PROMPT_PREFIX: &str = "Bacakan teks berikut dengan khidmat dan jelas: ";

/// Appended when a remote call fails
pub const CONNECTION_ERROR_TEXT: &str = "Terjadi kesalahan koneksi. Silakan coba lagi.";

/// Appended when a remote call returns nothing
pub const EMPTY_RESULT_TEXT: &str = "Maaf, terjadi kesalahan.";

pub const SUMMARIZE_PROMPT: &str = "Berikan ringkasan poin-poin penting dari teks berikut tanpa menghilangkan esensi Islaminya. HANYA berikan ringkasannya saja.";

pub const KIDS_PROMPT: &str = "Jelaskan ulang teks berikut dengan bahasa yang sangat sederhana agar mudah dipahami oleh anak usia 7-10 tahun. Tetap sertakan nilai moralnya.";

pub const ACADEMIC_PROMPT: &str = "Berikan analisis akademik lebih dalam dan sertakan referensi literatur Islam klasik (seperti Kitab Kuning) yang relevan dengan bahasan ini.";

pub const RELATED_PROMPT: &str = "Berikan 3-5 pertanyaan lanjutan atau topik terkait yang layak dipelajari untuk mendalami bahasan ini.";
