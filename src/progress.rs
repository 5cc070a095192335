//! Модуль отслеживания прогресса
//!
//! Обновления прогресса отправляются через опциональный mpsc-канал,
//! чтобы вызывающая сторона могла показывать состояние длительных операций.

use tokio::sync::mpsc::Sender;

/// Обновление прогресса для отправки клиенту
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// Началась обработка
    Started,
    /// Текст разбит на фрагменты
    Chunked {
        /// Количество фрагментов
        total: usize,
    },
    /// Озвучен очередной фрагмент
    Synthesis {
        /// Сколько фрагментов завершено
        completed: usize,
        /// Общее количество фрагментов
        total: usize,
    },
    /// Склейка аудиосегментов
    Assembling,
    /// Перекодирование аудио
    Transcoding,
    /// Упаковка аудиокниги
    Packaging,
    /// Обработка завершена
    Finished,
    /// Ошибка
    Error(String),
}

/// Асинхронно отправляет обновление прогресса
pub async fn send_progress(sender: &Option<Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        let _ = sender.send(update).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_send_progress_with_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        send_progress(&Some(tx), ProgressUpdate::Chunked { total: 7 }).await;
        match rx.recv().await {
            Some(ProgressUpdate::Chunked { total }) => assert_eq!(total, 7),
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_progress_without_channel() {
        // Отсутствие канала не должно приводить к ошибке
        send_progress(&None, ProgressUpdate::Started).await;
    }
}
